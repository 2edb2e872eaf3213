use std::sync::Arc;
use std::time::Duration;

use aemcheck_domain::{DiskDescriptor, SlaProfile};
use aemcheck_driver::{signing, StorageDataPlane};
use tracing::debug;

use crate::clock::Clock;
use crate::directory::{account_name_from_uri, AccountDirectory};
use crate::error::EngineError;
use crate::sink::Reporter;
use crate::sla;

/// Size assumed for a disk whose size cannot be determined (a P10 disk).
pub const ASSUMED_DISK_SIZE_GB: i64 = 127;

const GIB: u64 = 1 << 30;

/// Works out the provisioned size of unmanaged disks from their backing
/// page blobs.
pub struct DiskSizeResolver {
    accounts: Arc<AccountDirectory>,
    data_plane: Arc<dyn StorageDataPlane>,
    clock: Arc<dyn Clock>,
    reporter: Reporter,
    sas_validity: Duration,
}

impl DiskSizeResolver {
    pub fn new(
        accounts: Arc<AccountDirectory>,
        data_plane: Arc<dyn StorageDataPlane>,
        clock: Arc<dyn Clock>,
        reporter: Reporter,
        sas_validity: Duration,
    ) -> Self {
        Self { accounts, data_plane, clock, reporter, sas_validity }
    }

    /// Size in whole GiB of the blob at `uri`. Never fails: any problem is
    /// reported as a warning and yields `None`.
    pub async fn resolve_size_gb(&self, uri: &str) -> Option<i64> {
        match self.blob_size_gb(uri).await {
            Ok(size) => Some(size),
            Err(e) => {
                debug!(uri, error = %e, "disk size lookup failed");
                self.reporter.warning("Could not determine OS Disk size.");
                None
            }
        }
    }

    async fn blob_size_gb(&self, uri: &str) -> Result<i64, EngineError> {
        let account = account_name_from_uri(uri)?;
        let mut url = url::Url::parse(uri).map_err(|_| EngineError::MalformedUri(uri.to_string()))?;
        let (container, blob) = url
            .path()
            .trim_start_matches('/')
            .split_once('/')
            .filter(|(c, b)| !c.is_empty() && !b.is_empty())
            .map(|(c, b)| (c.to_string(), b.to_string()))
            .ok_or_else(|| EngineError::MalformedUri(uri.to_string()))?;

        let key = self.accounts.resolve_key(&account).await?;
        let expiry = chrono::Duration::from_std(self.sas_validity)
            .ok()
            .and_then(|validity| self.clock.utc_now().checked_add_signed(validity))
            .ok_or(EngineError::SasValidityOutOfRange(self.sas_validity))?;
        let sas = signing::blob_read_sas(&account, &key, &container, &blob, expiry)?;
        url.set_query(Some(&sas));

        let length = self.data_plane.blob_length(url.as_str()).await?;
        debug!(account, container, blob, length, "blob length");
        Ok((length / GIB) as i64)
    }

    /// SLA of one disk. The declared size wins; otherwise the blob is
    /// inspected; otherwise the disk is assumed to be a P10.
    pub async fn disk_sla_for(&self, disk: &DiskDescriptor) -> Result<SlaProfile, EngineError> {
        let size = match disk.declared_size_gb {
            Some(size) => Some(size),
            None => self.resolve_size_gb(&disk.backing_uri).await,
        };
        let size = size.unwrap_or_else(|| {
            self.reporter
                .warning("OS Disk size is empty and could not be determined. Assuming P10.");
            ASSUMED_DISK_SIZE_GB
        });
        sla::disk_sla(size)
    }
}
