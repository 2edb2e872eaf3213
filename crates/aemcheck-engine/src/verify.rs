//! Polls the diagnostics tables until the monitoring extension's telemetry
//! shows up or the deadline passes.
//!
//! Each wait loop is a [`Poller`]: query first, then (on a miss) print the
//! wait glyph, sleep one poll interval and re-check the deadline. A query
//! attempt is therefore always made at least once, and the loop never runs
//! more than one poll interval past the deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use aemcheck_config::Settings;
use aemcheck_domain::{OsType, TableFilter, TableOutcome, VerificationResult};
use aemcheck_driver::{StorageContext, StorageDataPlane};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::directory::AccountDirectory;
use crate::error::EngineError;
use crate::sink::{HostStyle, Reporter};

/// Which table a single-table wait looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSelector {
    Named(String),
    /// The first table, in the service's lexical listing order, whose name
    /// starts with the prefix. Re-evaluated on every attempt so a table
    /// created mid-wait is picked up.
    FirstMatchByPrefix(String),
}

#[derive(Debug, Clone)]
pub struct VerificationQuery {
    pub account_name: String,
    pub table: TableSelector,
    /// OData filter, see [`TableFilter`].
    pub filter: String,
    /// Printed, without a newline, after every unsuccessful attempt.
    pub wait_glyph: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling { attempt: u32 },
    Satisfied,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Satisfied | PollState::TimedOut)
    }
}

/// One wait loop against a deadline shared with other loops.
struct Poller<'a> {
    clock: &'a dyn Clock,
    reporter: &'a Reporter,
    wait_glyph: &'a str,
    poll_interval: Duration,
    start: Instant,
    timeout: Duration,
    attempts: u32,
    state: PollState,
}

impl<'a> Poller<'a> {
    fn begin(&mut self) {
        self.attempts = 1;
        self.state = PollState::Polling { attempt: 1 };
    }

    fn satisfy(&mut self) {
        self.state = PollState::Satisfied;
    }

    /// Called after a miss. Returns `false` once the deadline has passed.
    async fn wait(&mut self) -> bool {
        self.reporter.host(self.wait_glyph, HostStyle::INLINE);
        self.clock.sleep(self.poll_interval).await;

        let elapsed = self.clock.now().saturating_duration_since(self.start);
        if elapsed < self.timeout {
            self.attempts += 1;
            self.state = PollState::Polling { attempt: self.attempts };
            true
        } else {
            self.state = PollState::TimedOut;
            false
        }
    }
}

pub struct DiagnosticsVerifier {
    accounts: Arc<AccountDirectory>,
    data_plane: Arc<dyn StorageDataPlane>,
    clock: Arc<dyn Clock>,
    reporter: Reporter,
    settings: Arc<Settings>,
}

impl DiagnosticsVerifier {
    pub fn new(
        accounts: Arc<AccountDirectory>,
        data_plane: Arc<dyn StorageDataPlane>,
        clock: Arc<dyn Clock>,
        reporter: Reporter,
        settings: Arc<Settings>,
    ) -> Self {
        Self { accounts, data_plane, clock, reporter, settings }
    }

    fn poller<'a>(&'a self, wait_glyph: &'a str, start: Instant, timeout: Duration) -> Poller<'a> {
        Poller {
            clock: self.clock.as_ref(),
            reporter: &self.reporter,
            wait_glyph,
            poll_interval: self.settings.poll_interval,
            start,
            timeout,
            attempts: 0,
            state: PollState::Idle,
        }
    }

    // ── Single-table mode ─────────────────────────────────────────────────────

    /// Wait until the selected table holds at least one row matching the
    /// filter. Table lookup failures are treated as "not there yet".
    pub async fn verify_table(&self, query: &VerificationQuery) -> Result<bool, EngineError> {
        let ctx = self.accounts.storage_context(&query.account_name).await?;
        let start = self.clock.now();
        let mut poller = self.poller(&query.wait_glyph, start, query.timeout);
        info!(account = %query.account_name, table = ?query.table, "waiting for table content");

        let mut table = self.resolve_table(&ctx, &query.table).await;
        poller.begin();
        while !poller.state.is_terminal() {
            let found = match table.as_deref() {
                Some(name) => !self
                    .data_plane
                    .query_entities(&ctx, name, &query.filter, Some(1))
                    .await?
                    .is_empty(),
                None => false,
            };

            if found {
                poller.satisfy();
            } else if poller.wait().await {
                table = self.resolve_table(&ctx, &query.table).await;
            }
        }

        let satisfied = poller.state == PollState::Satisfied;
        debug!(table = ?table, satisfied, attempts = poller.attempts, "table wait finished");
        Ok(satisfied)
    }

    async fn resolve_table(&self, ctx: &StorageContext, selector: &TableSelector) -> Option<String> {
        let resolved = match selector {
            TableSelector::Named(name) => self
                .data_plane
                .table_exists(ctx, name)
                .await
                .map(|exists| exists.then(|| name.clone())),
            TableSelector::FirstMatchByPrefix(prefix) => self
                .data_plane
                .list_tables(ctx)
                .await
                .map(|tables| first_match_by_prefix(&tables, prefix).map(str::to_string)),
        };
        resolved.unwrap_or_else(|e| {
            debug!(error = %e, "table lookup failed");
            None
        })
    }

    // ── Multi-table mode ──────────────────────────────────────────────────────

    /// Check that every diagnostics table for `os_type` has a row for this
    /// deployment and host newer than the search window. The tables share
    /// one deadline; the first table that runs out of time ends the run.
    pub async fn verify_diagnostics(
        &self,
        account_name: &str,
        deployment_id: &str,
        host: &str,
        os_type: OsType,
        wait_glyph: &str,
        timeout: Duration,
    ) -> Result<VerificationResult, EngineError> {
        let ctx = self.accounts.storage_context(account_name).await?;
        let start = self.clock.now();
        let now = self.clock.utc_now();
        let since = chrono::Duration::from_std(self.settings.search_window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let filter = TableFilter::eq("DeploymentId", deployment_id)
            .and(TableFilter::eq("Host", host).and(TableFilter::ge_datetime("Timestamp", since)))
            .into_string();

        let mut result = VerificationResult { succeeded: true, per_table: Vec::new() };
        for table in self.settings.tables_for(os_type) {
            let mut poller = self.poller(wait_glyph, start, timeout);
            poller.begin();
            while !poller.state.is_terminal() {
                if self.has_rows(&ctx, table, &filter).await? {
                    poller.satisfy();
                } else {
                    poller.wait().await;
                }
            }

            let found = poller.state == PollState::Satisfied;
            debug!(table, found, attempts = poller.attempts, "diagnostics table checked");
            result.per_table.push(TableOutcome { table: table.clone(), found });
            if !found {
                self.reporter
                    .verbose(&format!("PerfCounter Table {} not found", table));
                result.succeeded = false;
                break;
            }
        }

        Ok(result)
    }

    /// A table that does not exist yet simply has no rows.
    async fn has_rows(&self, ctx: &StorageContext, table: &str, filter: &str) -> Result<bool, EngineError> {
        match self.data_plane.query_entities(ctx, table, filter, Some(1)).await {
            Ok(rows) => Ok(!rows.is_empty()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// First name in `tables` starting with `prefix`. The Table service lists
/// names in lexical order, so this is the lexically smallest match.
pub fn first_match_by_prefix<'a>(tables: &'a [String], prefix: &str) -> Option<&'a str> {
    tables
        .iter()
        .map(String::as_str)
        .find(|t| t.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, ScriptedDataPlane};
    use std::sync::atomic::Ordering;

    const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

    fn verifier(h: &Harness) -> DiagnosticsVerifier {
        DiagnosticsVerifier::new(
            h.accounts(),
            h.data_plane.clone(),
            h.clock.clone(),
            h.reporter(),
            h.settings.clone(),
        )
    }

    fn query(table: TableSelector, timeout: Duration) -> VerificationQuery {
        VerificationQuery {
            account_name: "acct".into(),
            table,
            filter: "PartitionKey eq 'x'".into(),
            wait_glyph: ".".into(),
            timeout,
        }
    }

    #[test]
    fn prefix_policy_takes_first_listed_match() {
        let tables: Vec<String> = ["Other", "WADMetricsPT1MP10DV2S20240101", "WADMetricsPT1MP10DV2S20240201"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            first_match_by_prefix(&tables, "WADMetricsPT1M"),
            Some("WADMetricsPT1MP10DV2S20240101")
        );
        assert_eq!(first_match_by_prefix(&tables, "Nope"), None);
    }

    #[tokio::test]
    async fn linux_tables_all_satisfied() {
        let h = Harness::new(
            ScriptedDataPlane::new()
                .table("LinuxCpuVer2v0", Some(1))
                .table("LinuxDiskVer2v0", Some(2))
                .table("LinuxMemoryVer2v0", Some(1)),
        );
        let result = verifier(&h)
            .verify_diagnostics("acct", "/subscriptions/s/vm", "sapvm01", OsType::Linux, ".", FIFTEEN_MINUTES)
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.per_table.len(), 3);
        assert_eq!(result.found("LinuxDiskVer2v0"), Some(true));
        assert_eq!(h.clock.sleeps.load(Ordering::SeqCst), 1);
        assert_eq!(h.sink.host_transcript(), ".");
    }

    #[tokio::test]
    async fn shared_deadline_stops_second_table() {
        let h = Harness::new(
            ScriptedDataPlane::new()
                .table("LinuxCpuVer2v0", Some(1))
                .table("LinuxDiskVer2v0", None)
                .table("LinuxMemoryVer2v0", Some(1)),
        );
        let result = verifier(&h)
            .verify_diagnostics("acct", "dep", "host", OsType::Linux, ".", FIFTEEN_MINUTES)
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.found("LinuxCpuVer2v0"), Some(true));
        assert_eq!(result.found("LinuxDiskVer2v0"), Some(false));
        // Tables after the first timeout are never attempted.
        assert_eq!(result.found("LinuxMemoryVer2v0"), None);
        assert_eq!(h.data_plane.query_count("LinuxMemoryVer2v0"), 0);

        let elapsed = h.clock.elapsed();
        assert!(elapsed >= FIFTEEN_MINUTES, "stopped early: {:?}", elapsed);
        assert!(
            elapsed <= FIFTEEN_MINUTES + h.settings.poll_interval,
            "polled past the deadline: {:?}",
            elapsed
        );
        assert_eq!(h.sink.verbose_lines(), ["PerfCounter Table LinuxDiskVer2v0 not found"]);
    }

    #[tokio::test]
    async fn deadline_is_not_reset_per_table() {
        // First table needs most of the budget; the second never shows up.
        let first_ok_at = 150;
        let h = Harness::new(
            ScriptedDataPlane::new()
                .table("LinuxCpuVer2v0", Some(first_ok_at))
                .table("LinuxDiskVer2v0", None),
        );
        let result = verifier(&h)
            .verify_diagnostics("acct", "dep", "host", OsType::Linux, ".", FIFTEEN_MINUTES)
            .await
            .unwrap();

        assert!(!result.succeeded);
        let elapsed = h.clock.elapsed();
        assert!(elapsed <= FIFTEEN_MINUTES + h.settings.poll_interval, "{:?}", elapsed);
        // 149 sleeps for the first table; the rest of the budget for the second.
        assert_eq!(h.data_plane.query_count("LinuxDiskVer2v0"), 180 - (first_ok_at - 1));
    }

    #[tokio::test]
    async fn missing_table_counts_as_no_rows() {
        let h = Harness::new(ScriptedDataPlane::new());
        let result = verifier(&h)
            .verify_diagnostics("acct", "dep", "host", OsType::Windows, "*", Duration::from_secs(20))
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.per_table, [TableOutcome {
            table: "WADPerformanceCountersTable".into(),
            found: false,
        }]);
        assert_eq!(h.data_plane.query_count("WADPerformanceCountersTable"), 4);
        assert_eq!(h.sink.host_transcript(), "****");
    }

    #[tokio::test]
    async fn every_table_is_queried_even_past_the_deadline() {
        let h = Harness::new(
            ScriptedDataPlane::new()
                .table("LinuxCpuVer2v0", Some(1))
                .table("LinuxDiskVer2v0", Some(1))
                .table("LinuxMemoryVer2v0", Some(1)),
        );
        let result = verifier(&h)
            .verify_diagnostics("acct", "dep", "host", OsType::Linux, ".", Duration::ZERO)
            .await
            .unwrap();

        assert!(result.succeeded);
        for table in ["LinuxCpuVer2v0", "LinuxDiskVer2v0", "LinuxMemoryVer2v0"] {
            assert_eq!(h.data_plane.query_count(table), 1, "{table}");
        }
        assert_eq!(h.clock.sleeps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn query_filter_scopes_deployment_host_and_window() {
        let h = Harness::new(ScriptedDataPlane::new().table("WADPerformanceCountersTable", Some(1)));
        verifier(&h)
            .verify_diagnostics("acct", "dep'1", "vm1", OsType::Windows, ".", FIFTEEN_MINUTES)
            .await
            .unwrap();

        assert_eq!(
            h.data_plane.filters(),
            ["(DeploymentId eq 'dep''1') and ((Host eq 'vm1') and (Timestamp ge datetime'2024-03-01T11:55:00.0000000Z'))"]
        );
    }

    #[tokio::test]
    async fn unrepresentable_search_window_starts_at_epoch() {
        let mut h = Harness::new(ScriptedDataPlane::new().table("WADPerformanceCountersTable", Some(1)));
        for window in [Duration::from_secs(9_000_000_000_000_000), Duration::MAX] {
            h.settings = Arc::new(Settings { search_window: window, ..Settings::default() });
            let result = verifier(&h)
                .verify_diagnostics("acct", "dep", "vm1", OsType::Windows, ".", FIFTEEN_MINUTES)
                .await
                .unwrap();
            assert!(result.succeeded);
        }

        for filter in h.data_plane.filters() {
            assert!(filter.ends_with("(Timestamp ge datetime'1970-01-01T00:00:00.0000000Z'))"), "got: {}", filter);
        }
    }

    #[tokio::test]
    async fn auth_failure_aborts_instead_of_timing_out() {
        let h = Harness::new(
            ScriptedDataPlane::new()
                .table("WADPerformanceCountersTable", Some(1))
                .failing_queries(403),
        );
        let err = verifier(&h)
            .verify_diagnostics("acct", "dep", "host", OsType::Windows, ".", FIFTEEN_MINUTES)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Driver(_)), "got: {}", err);
        assert_eq!(h.clock.sleeps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_account_is_a_hard_failure() {
        let h = Harness::new(ScriptedDataPlane::new());
        let q = VerificationQuery { account_name: "nope".into(), ..query(TableSelector::Named("T".into()), FIFTEEN_MINUTES) };
        assert!(matches!(
            verifier(&h).verify_table(&q).await,
            Err(EngineError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn named_table_found_immediately() {
        let h = Harness::new(ScriptedDataPlane::new().table("SchemasTable", Some(1)));
        let ok = verifier(&h)
            .verify_table(&query(TableSelector::Named("SchemasTable".into()), FIFTEEN_MINUTES))
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(h.clock.sleeps.load(Ordering::SeqCst), 0);
        assert_eq!(h.sink.host_transcript(), "");
    }

    #[tokio::test]
    async fn named_table_times_out() {
        let h = Harness::new(ScriptedDataPlane::new().table("SchemasTable", None));
        let timeout = Duration::from_secs(60);
        let ok = verifier(&h)
            .verify_table(&query(TableSelector::Named("SchemasTable".into()), timeout))
            .await
            .unwrap();

        assert!(!ok);
        assert_eq!(h.clock.elapsed(), timeout);
        assert_eq!(h.sink.host_transcript(), ".".repeat(12));
    }

    #[tokio::test]
    async fn discovery_picks_up_table_created_mid_wait() {
        let h = Harness::new(
            ScriptedDataPlane::new()
                .table("Unrelated", Some(1))
                .late_table("WADMetricsPT1MP10DV2S20240301", 3, Some(1)),
        );
        let ok = verifier(&h)
            .verify_table(&query(
                TableSelector::FirstMatchByPrefix("WADMetricsPT1M".into()),
                FIFTEEN_MINUTES,
            ))
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(h.clock.sleeps.load(Ordering::SeqCst), 2);
        assert_eq!(h.data_plane.query_count("WADMetricsPT1MP10DV2S20240301"), 1);
    }
}
