use std::collections::HashMap;
use std::time::Duration;

use aemcheck_domain::OsType;

pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
pub const DEFAULT_METRICS_TABLE_PREFIX: &str = "WADMetricsPT1M";
pub const DEFAULT_TRANSFER_PERIOD: &str = "PT1M";
pub const DEFAULT_MIN_QUOTA_MB: i64 = 4096;

/// Operator-tunable literals used by the verification engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Used when the endpoint suffix cannot be read off an account's blob host.
    pub default_endpoint_suffix: String,
    pub poll_interval: Duration,
    /// Shared deadline for one verification call.
    pub timeout: Duration,
    pub search_window: Duration,
    pub metrics_table_prefix: String,
    pub diagnostics_tables: HashMap<OsType, Vec<String>>,
    pub min_quota_mb: i64,
    pub transfer_period: String,
    pub sas_validity: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        let mut diagnostics_tables = HashMap::new();
        diagnostics_tables.insert(
            OsType::Linux,
            vec![
                "LinuxCpuVer2v0".to_string(),
                "LinuxDiskVer2v0".to_string(),
                "LinuxMemoryVer2v0".to_string(),
            ],
        );
        diagnostics_tables.insert(
            OsType::Windows,
            vec!["WADPerformanceCountersTable".to_string()],
        );

        Self {
            default_endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(15 * 60),
            search_window: Duration::from_secs(5 * 60),
            metrics_table_prefix: DEFAULT_METRICS_TABLE_PREFIX.to_string(),
            diagnostics_tables,
            min_quota_mb: DEFAULT_MIN_QUOTA_MB,
            transfer_period: DEFAULT_TRANSFER_PERIOD.to_string(),
            sas_validity: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Settings {
    /// Tables that must carry rows for a VM of the given OS type.
    pub fn tables_for(&self, os: OsType) -> &[String] {
        self.diagnostics_tables
            .get(&os)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
