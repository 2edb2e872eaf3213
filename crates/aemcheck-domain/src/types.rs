use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// ── Storage accounts ──────────────────────────────────────────────────────────

/// A storage account as reported by the directory. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAccountRef {
    pub name: String,
    /// Full ARM resource id, e.g.
    /// `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Storage/storageAccounts/{name}`.
    pub resource_id: String,
    /// SKU label as the directory reports it (`Premium_LRS`, `Standard_GRS`, ...).
    /// Absent when the directory omitted it.
    pub account_type: Option<String>,
    pub blob_endpoint_host: String,
    pub table_endpoint_host: String,
}

// ── Enums ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsType {
    Linux,
    Windows,
}

impl std::str::FromStr for OsType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(OsType::Linux),
            "windows" => Ok(OsType::Windows),
            _ => Err(DomainError::UnknownOsType(s.to_string())),
        }
    }
}

impl std::fmt::Display for OsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsType::Linux => write!(f, "Linux"),
            OsType::Windows => write!(f, "Windows"),
        }
    }
}

/// Premium disk performance class, selected by provisioned size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiskTier {
    P10,
    P20,
    P30,
}

impl DiskTier {
    pub fn iops(&self) -> &'static str {
        match self {
            DiskTier::P10 => "500",
            DiskTier::P20 => "2300",
            DiskTier::P30 => "5000",
        }
    }

    /// Throughput in MB/s.
    pub fn throughput(&self) -> &'static str {
        match self {
            DiskTier::P10 => "100",
            DiskTier::P20 => "150",
            DiskTier::P30 => "200",
        }
    }

    pub fn sla(&self) -> SlaProfile {
        SlaProfile::new(self.iops(), self.throughput())
    }
}

impl std::fmt::Display for DiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskTier::P10 => write!(f, "P10"),
            DiskTier::P20 => write!(f, "P20"),
            DiskTier::P30 => write!(f, "P30"),
        }
    }
}

// ── SLA ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaProfile {
    pub has_sla: bool,
    pub iops: String,
    /// MB/s.
    pub throughput: String,
}

impl SlaProfile {
    pub fn new(iops: impl Into<String>, throughput: impl Into<String>) -> Self {
        Self {
            has_sla: true,
            iops: iops.into(),
            throughput: throughput.into(),
        }
    }

    /// Unknown size or tier: no performance claim is made.
    pub fn none() -> Self {
        Self::default()
    }
}

// ── Disks ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDescriptor {
    pub declared_size_gb: Option<i64>,
    /// URI of the page blob that backs the disk.
    pub backing_uri: String,
}

// ── Verification ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOutcome {
    pub table: String,
    pub found: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub succeeded: bool,
    /// Tables in the order they were attempted. Tables skipped after an
    /// earlier timeout do not appear.
    pub per_table: Vec<TableOutcome>,
}

impl VerificationResult {
    pub fn found(&self, table: &str) -> Option<bool> {
        self.per_table.iter().find(|o| o.table == table).map(|o| o.found)
    }
}

// ── Audits ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialCheck {
    pub label: String,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    pub label: String,
    pub passed: bool,
    pub partial_results: Vec<PartialCheck>,
}

impl AuditResult {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            passed: true,
            partial_results: Vec::new(),
        }
    }

    pub fn push(&mut self, label: impl Into<String>, passed: bool) {
        self.partial_results.push(PartialCheck {
            label: label.into(),
            passed,
        });
    }

    /// Logical AND over the recorded partial checks. Callers decide whether
    /// to fold this into `passed`; existence-only checks are advisory.
    pub fn all_partials_passed(&self) -> bool {
        self.partial_results.iter().all(|p| p.passed)
    }
}
