use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw YAML representation of the settings file. Every field is optional;
/// absent fields keep their built-in defaults.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawSettings {
    pub default_endpoint_suffix: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub timeout_minutes: Option<u64>,
    /// How far back the diagnostics filter looks for rows.
    pub search_window_minutes: Option<u64>,
    pub metrics_table_prefix: Option<String>,
    /// OS type ("linux" / "windows") to the tables that must carry rows.
    #[serde(default)]
    pub diagnostics_tables: HashMap<String, Vec<String>>,
    pub min_quota_mb: Option<i64>,
    pub transfer_period: Option<String>,
    pub sas_validity_hours: Option<u64>,
}
