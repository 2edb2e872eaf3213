//! Storage account resolution with per-instance caches.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use aemcheck_domain::StorageAccountRef;
use aemcheck_driver::{StorageContext, StorageDirectory};
use regex::Regex;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::EngineError;
use crate::sink::Reporter;
use crate::sla;

static RESOURCE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/subscriptions/([^/]+)/resourceGroups/([^/]+)/providers/(\w+)")
        .expect("resource id pattern is valid")
});

/// Resolves storage accounts and their primary keys by name.
///
/// Both caches are keyed by the lower-cased account name, populated on first
/// successful lookup and never invalidated. Failed lookups are not cached.
/// When two callers miss at once both may hit the directory; the first
/// insert wins.
pub struct AccountDirectory {
    directory: Arc<dyn StorageDirectory>,
    reporter: Reporter,
    default_endpoint_suffix: String,
    accounts: RwLock<HashMap<String, StorageAccountRef>>,
    keys: RwLock<HashMap<String, String>>,
}

impl AccountDirectory {
    pub fn new(
        directory: Arc<dyn StorageDirectory>,
        reporter: Reporter,
        default_endpoint_suffix: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            reporter,
            default_endpoint_suffix: default_endpoint_suffix.into(),
            accounts: RwLock::new(HashMap::new()),
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Case-insensitive lookup. A miss lists every account in scope once.
    pub async fn resolve_account(&self, name: &str) -> Result<StorageAccountRef, EngineError> {
        if name.is_empty() {
            return Err(EngineError::AccountNotFound(String::new()));
        }
        let cache_key = name.to_ascii_lowercase();
        if let Some(account) = self.accounts.read().await.get(&cache_key) {
            return Ok(account.clone());
        }

        debug!(account = name, "storage account cache miss, listing accounts");
        let found = self
            .directory
            .list_accounts()
            .await?
            .into_iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| EngineError::AccountNotFound(name.to_string()))?;

        let mut cache = self.accounts.write().await;
        Ok(cache.entry(cache_key).or_insert(found).clone())
    }

    /// Primary (`key1`) access key of the account.
    pub async fn resolve_key(&self, name: &str) -> Result<String, EngineError> {
        let cache_key = name.to_ascii_lowercase();
        if let Some(key) = self.keys.read().await.get(&cache_key) {
            return Ok(key.clone());
        }

        let account = self.resolve_account(name).await?;
        let resource_group = resource_group_from_id(&account.resource_id)?;
        debug!(account = %account.name, resource_group, "listing storage account keys");
        let primary = self
            .directory
            .list_keys(&resource_group, &account.name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::NoAccessKeys(account.name.clone()))?;

        let mut cache = self.keys.write().await;
        Ok(cache.entry(cache_key).or_insert(primary).clone())
    }

    /// DNS suffix after `.blob.` in the account's blob endpoint, e.g.
    /// `core.windows.net`. Falls back to the configured default with a warning.
    pub async fn endpoint_suffix(&self, name: &str) -> Result<String, EngineError> {
        let account = self.resolve_account(name).await?;
        match account.blob_endpoint_host.split_once(".blob.") {
            Some((_, suffix)) if !suffix.is_empty() => Ok(suffix.to_string()),
            _ => {
                self.reporter.warning(&format!(
                    "Could not extract endpoint information from Azure Storage Account. Using default {}",
                    self.default_endpoint_suffix
                ));
                Ok(self.default_endpoint_suffix.clone())
            }
        }
    }

    pub async fn is_premium_account(&self, name: &str) -> Result<bool, EngineError> {
        let account = self.resolve_account(name).await?;
        sla::is_premium(&account)
    }

    /// Primary table endpoint, e.g. `https://acct.table.core.windows.net/`.
    pub async fn table_endpoint(&self, name: &str) -> Result<String, EngineError> {
        let account = self.resolve_account(name).await?;
        if !account.table_endpoint_host.is_empty() {
            return Ok(format!("https://{}/", account.table_endpoint_host));
        }
        let suffix = self.endpoint_suffix(name).await?;
        Ok(format!("https://{}.table.{}/", account.name, suffix))
    }

    /// Name, key and endpoints for data-plane calls.
    pub async fn storage_context(&self, name: &str) -> Result<StorageContext, EngineError> {
        let account = self.resolve_account(name).await?;
        let key = self.resolve_key(name).await?;
        let suffix = self.endpoint_suffix(name).await?;
        Ok(StorageContext::new(&account.name, &key, &suffix))
    }
}

/// Leftmost DNS label of the URI's host: the account name for
/// `https://acct.blob.core.windows.net/vhds/os.vhd`.
pub fn account_name_from_uri(uri: &str) -> Result<String, EngineError> {
    let malformed = || EngineError::MalformedUri(uri.to_string());
    let parsed = url::Url::parse(uri).map_err(|_| malformed())?;
    let host = parsed.host_str().ok_or_else(malformed)?;
    match host.split_once('.') {
        Some((label, rest)) if !label.is_empty() && !rest.is_empty() => Ok(label.to_string()),
        _ => Err(malformed()),
    }
}

/// Resource group segment of an ARM resource id.
pub fn resource_group_from_id(id: &str) -> Result<String, EngineError> {
    RESOURCE_ID
        .captures(id)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| EngineError::MalformedResourceId(id.to_string()))
}
