//! In-crate fakes for the driver capabilities and the clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use aemcheck_config::Settings;
use aemcheck_domain::{ServiceProperties, StorageAccountRef};
use aemcheck_driver::{DriverError, StorageContext, StorageDataPlane, StorageDirectory};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::clock::Clock;
use crate::directory::AccountDirectory;
use crate::sink::{MemorySink, Reporter};

/// base64("secret-key")
pub(crate) const KEY: &str = "c2VjcmV0LWtleQ==";

pub(crate) fn account(name: &str, sku: Option<&str>) -> StorageAccountRef {
    StorageAccountRef {
        name: name.to_string(),
        resource_id: format!(
            "/subscriptions/sub-1/resourceGroups/rg-{0}/providers/Microsoft.Storage/storageAccounts/{0}",
            name
        ),
        account_type: sku.map(str::to_string),
        blob_endpoint_host: format!("{}.blob.core.windows.net", name),
        table_endpoint_host: format!("{}.table.core.windows.net", name),
    }
}

// ── Directory ─────────────────────────────────────────────────────────────────

pub(crate) struct CountingDirectory {
    accounts: Vec<StorageAccountRef>,
    keys: HashMap<String, Vec<String>>,
    pub list_calls: AtomicUsize,
    pub key_calls: AtomicUsize,
    resource_groups: Mutex<Vec<String>>,
}

impl CountingDirectory {
    pub fn new(accounts: Vec<StorageAccountRef>) -> Self {
        Self {
            accounts,
            keys: HashMap::new(),
            list_calls: AtomicUsize::new(0),
            key_calls: AtomicUsize::new(0),
            resource_groups: Mutex::new(Vec::new()),
        }
    }

    pub fn with_keys(mut self, account: &str, keys: &[&str]) -> Self {
        self.keys
            .insert(account.to_string(), keys.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn last_resource_group(&self) -> Option<String> {
        self.resource_groups.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl StorageDirectory for CountingDirectory {
    async fn list_accounts(&self) -> Result<Vec<StorageAccountRef>, DriverError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.clone())
    }

    async fn list_keys(&self, resource_group: &str, account_name: &str) -> Result<Vec<String>, DriverError> {
        self.key_calls.fetch_add(1, Ordering::SeqCst);
        self.resource_groups.lock().unwrap().push(resource_group.to_string());
        Ok(self.keys.get(account_name).cloned().unwrap_or_default())
    }
}

// ── Data plane ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct TableScript {
    /// Table becomes visible on this list/exists probe (1-based). 0 = always.
    visible_from_probe: usize,
    /// Queries return a row from this query attempt on (1-based). None = never.
    rows_from_query: Option<usize>,
}

/// Data plane whose tables, rows, blobs and failures are scripted up front.
#[derive(Default)]
pub(crate) struct ScriptedDataPlane {
    tables: Vec<(String, TableScript)>,
    blobs: HashMap<String, u64>,
    properties: Option<ServiceProperties>,
    query_failure: Option<u16>,
    probes: AtomicUsize,
    query_counts: Mutex<HashMap<String, usize>>,
    filters: Mutex<Vec<String>>,
    blob_requests: Mutex<Vec<String>>,
}

impl ScriptedDataPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table that exists from the start and has rows from query `rows_from` on.
    pub fn table(mut self, name: &str, rows_from: Option<usize>) -> Self {
        self.tables.push((
            name.to_string(),
            TableScript { visible_from_probe: 0, rows_from_query: rows_from },
        ));
        self.tables.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }

    /// Table that only shows up on the given listing/existence probe.
    pub fn late_table(mut self, name: &str, visible_from_probe: usize, rows_from: Option<usize>) -> Self {
        self.tables.push((
            name.to_string(),
            TableScript { visible_from_probe, rows_from_query: rows_from },
        ));
        self.tables.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }

    /// `url` without query string.
    pub fn blob(mut self, url: &str, length: u64) -> Self {
        self.blobs.insert(url.to_string(), length);
        self
    }

    pub fn properties(mut self, props: ServiceProperties) -> Self {
        self.properties = Some(props);
        self
    }

    pub fn failing_queries(mut self, status: u16) -> Self {
        self.query_failure = Some(status);
        self
    }

    pub fn query_count(&self, table: &str) -> usize {
        self.query_counts.lock().unwrap().get(table).copied().unwrap_or(0)
    }

    pub fn filters(&self) -> Vec<String> {
        self.filters.lock().unwrap().clone()
    }

    pub fn blob_requests(&self) -> Vec<String> {
        self.blob_requests.lock().unwrap().clone()
    }

    fn visible(&self, script: &TableScript) -> bool {
        self.probes.load(Ordering::SeqCst) >= script.visible_from_probe
    }

    fn script(&self, table: &str) -> Option<&TableScript> {
        self.tables.iter().find(|(n, _)| n == table).map(|(_, s)| s)
    }
}

#[async_trait]
impl StorageDataPlane for ScriptedDataPlane {
    async fn blob_length(&self, blob_url: &str) -> Result<u64, DriverError> {
        self.blob_requests.lock().unwrap().push(blob_url.to_string());
        let base = blob_url.split('?').next().unwrap_or(blob_url);
        self.blobs
            .get(base)
            .copied()
            .ok_or_else(|| DriverError::NotFound(base.to_string()))
    }

    async fn list_tables(&self, _ctx: &StorageContext) -> Result<Vec<String>, DriverError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tables
            .iter()
            .filter(|(_, s)| self.visible(s))
            .map(|(n, _)| n.clone())
            .collect())
    }

    async fn table_exists(&self, _ctx: &StorageContext, table: &str) -> Result<bool, DriverError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.script(table).is_some_and(|s| self.visible(s)))
    }

    async fn query_entities(
        &self,
        _ctx: &StorageContext,
        table: &str,
        filter: &str,
        _top: Option<u32>,
    ) -> Result<Vec<Value>, DriverError> {
        if let Some(status) = self.query_failure {
            return Err(DriverError::Status {
                url: format!("/{}()", table),
                status,
                message: "AuthenticationFailed".into(),
            });
        }
        self.filters.lock().unwrap().push(filter.to_string());
        let attempt = {
            let mut counts = self.query_counts.lock().unwrap();
            let n = counts.entry(table.to_string()).or_insert(0);
            *n += 1;
            *n
        };

        let script = self
            .script(table)
            .filter(|s| self.visible(s))
            .ok_or_else(|| DriverError::NotFound(format!("table {}", table)))?;
        match script.rows_from_query {
            Some(from) if attempt >= from => Ok(vec![json!({ "PartitionKey": "p", "RowKey": "r" })]),
            _ => Ok(Vec::new()),
        }
    }

    async fn service_properties(&self, _ctx: &StorageContext) -> Result<ServiceProperties, DriverError> {
        self.properties
            .clone()
            .ok_or_else(|| DriverError::Status { url: "/".into(), status: 403, message: "denied".into() })
    }
}

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Virtual time: `sleep` advances the clock instantly.
pub(crate) struct ManualClock {
    base: Instant,
    base_utc: DateTime<Utc>,
    offset: Mutex<Duration>,
    pub sleeps: AtomicUsize,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            base_utc: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: AtomicUsize::new(0),
        }
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.base_utc + chrono::Duration::from_std(self.elapsed()).unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        *self.offset.lock().unwrap() += duration;
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

pub(crate) struct Harness {
    pub directory: Arc<CountingDirectory>,
    pub data_plane: Arc<ScriptedDataPlane>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<MemorySink>,
    pub settings: Arc<Settings>,
}

impl Harness {
    /// One premium account `acct` with key [`KEY`].
    pub fn new(data_plane: ScriptedDataPlane) -> Self {
        let directory = CountingDirectory::new(vec![account("acct", Some("Premium_LRS"))])
            .with_keys("acct", &[KEY, "c2Vjb25k"]);
        Self::with_directory(directory, data_plane)
    }

    pub fn with_directory(directory: CountingDirectory, data_plane: ScriptedDataPlane) -> Self {
        Self {
            directory: Arc::new(directory),
            data_plane: Arc::new(data_plane),
            clock: Arc::new(ManualClock::new()),
            sink: Arc::new(MemorySink::new()),
            settings: Arc::new(Settings::default()),
        }
    }

    pub fn reporter(&self) -> Reporter {
        Reporter::new(self.sink.clone())
    }

    pub fn accounts(&self) -> Arc<AccountDirectory> {
        Arc::new(AccountDirectory::new(
            self.directory.clone(),
            self.reporter(),
            self.settings.default_endpoint_suffix.clone(),
        ))
    }
}
