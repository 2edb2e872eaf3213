//! Published premium storage performance figures.

use aemcheck_domain::{DiskTier, SlaProfile, StorageAccountRef};

use crate::error::EngineError;

/// VM size, max uncached IOPS, max throughput (MB/s).
const VM_SLA: &[(&str, &str, &str)] = &[
    ("Standard_DS1", "3200", "32"),
    ("Standard_DS2", "6400", "64"),
    ("Standard_DS3", "12800", "128"),
    ("Standard_DS4", "25600", "256"),
    ("Standard_DS11", "6400", "64"),
    ("Standard_DS12", "12800", "128"),
    ("Standard_DS13", "25600", "256"),
    ("Standard_DS14", "50000", "512"),
    ("Standard_GS1", "5000", "125"),
    ("Standard_GS2", "10000", "250"),
    ("Standard_GS3", "20000", "500"),
    ("Standard_GS4", "40000", "1000"),
    ("Standard_GS5", "80000", "2000"),
];

/// SLA of a VM size. Sizes are matched exactly; anything not listed has no SLA.
pub fn vm_sla(vm_size: &str) -> SlaProfile {
    VM_SLA
        .iter()
        .find(|(size, _, _)| *size == vm_size)
        .map(|(_, iops, tp)| SlaProfile::new(*iops, *tp))
        .unwrap_or_else(SlaProfile::none)
}

/// Tier for a provisioned size: `(0,128]` P10, `(128,512]` P20, `(512,1024]` P30.
pub fn disk_tier(size_gb: i64) -> Result<DiskTier, EngineError> {
    match size_gb {
        1..=128 => Ok(DiskTier::P10),
        129..=512 => Ok(DiskTier::P20),
        513..=1024 => Ok(DiskTier::P30),
        _ => Err(EngineError::UnknownDiskTier(size_gb)),
    }
}

pub fn disk_sla(size_gb: i64) -> Result<SlaProfile, EngineError> {
    disk_tier(size_gb).map(|t| t.sla())
}

/// `Premium*` SKUs. Fails when the directory did not report a type.
pub fn is_premium(account: &StorageAccountRef) -> Result<bool, EngineError> {
    account
        .account_type
        .as_deref()
        .map(|t| t.starts_with("Premium"))
        .ok_or_else(|| EngineError::MissingAccountType(account.name.clone()))
}
