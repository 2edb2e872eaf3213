use std::sync::Arc;

use aemcheck_config::Settings;
use aemcheck_domain::{DiskDescriptor, SlaProfile, VerificationResult, VirtualMachine};
use aemcheck_driver::{StorageDataPlane, StorageDirectory};
use tracing::info;

use crate::audit::ConfigAuditor;
use crate::clock::Clock;
use crate::directory::{account_name_from_uri, AccountDirectory};
use crate::disk::DiskSizeResolver;
use crate::error::EngineError;
use crate::sink::{OutputSink, Reporter};
use crate::sla;
use crate::verify::{DiagnosticsVerifier, VerificationQuery};

/// One verification run. Owns the account caches; dropping the engine
/// drops them.
pub struct MonitoringEngine {
    accounts: Arc<AccountDirectory>,
    disks: DiskSizeResolver,
    verifier: DiagnosticsVerifier,
    auditor: ConfigAuditor,
    reporter: Reporter,
    settings: Arc<Settings>,
}

impl MonitoringEngine {
    pub fn new(
        directory: Arc<dyn StorageDirectory>,
        data_plane: Arc<dyn StorageDataPlane>,
        sink: Arc<dyn OutputSink>,
        clock: Arc<dyn Clock>,
        settings: Settings,
    ) -> Self {
        let reporter = Reporter::new(sink);
        let settings = Arc::new(settings);
        let accounts = Arc::new(AccountDirectory::new(
            directory,
            reporter.clone(),
            settings.default_endpoint_suffix.clone(),
        ));
        let disks = DiskSizeResolver::new(
            accounts.clone(),
            data_plane.clone(),
            clock.clone(),
            reporter.clone(),
            settings.sas_validity,
        );
        let verifier = DiagnosticsVerifier::new(
            accounts.clone(),
            data_plane.clone(),
            clock,
            reporter.clone(),
            settings.clone(),
        );
        let auditor = ConfigAuditor::new(accounts.clone(), data_plane, reporter.clone(), settings.clone());

        Self { accounts, disks, verifier, auditor, reporter, settings }
    }

    pub fn accounts(&self) -> &AccountDirectory {
        &self.accounts
    }

    pub fn disks(&self) -> &DiskSizeResolver {
        &self.disks
    }

    pub fn verifier(&self) -> &DiagnosticsVerifier {
        &self.verifier
    }

    pub fn auditor(&self) -> &ConfigAuditor {
        &self.auditor
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn vm_sla(&self, vm: &VirtualMachine) -> SlaProfile {
        sla::vm_sla(&vm.hardware_profile.vm_size)
    }

    /// SLA of every VHD-backed disk, OS disk first and data disks by LUN.
    /// Disks on standard storage carry no SLA.
    pub async fn disk_slas(&self, vm: &VirtualMachine) -> Result<Vec<(DiskDescriptor, SlaProfile)>, EngineError> {
        let mut out = Vec::new();
        for disk in vm.disks() {
            let account = account_name_from_uri(&disk.backing_uri)?;
            let sla = if self.accounts.is_premium_account(&account).await? {
                self.disks.disk_sla_for(&disk).await?
            } else {
                SlaProfile::none()
            };
            out.push((disk, sla));
        }
        Ok(out)
    }

    /// Multi-table check for `vm`: its resource id is the deployment id and
    /// its name the host.
    pub async fn verify_diagnostics_for_vm(
        &self,
        vm: &VirtualMachine,
        account_name: &str,
        wait_glyph: &str,
    ) -> Result<VerificationResult, EngineError> {
        let os_type = vm
            .os_type()
            .ok_or_else(|| EngineError::UnknownOsType(format!("none reported by VM {}", vm.name)))?;
        info!(vm = %vm.name, account = account_name, %os_type, "verifying diagnostics tables");
        self.verifier
            .verify_diagnostics(account_name, &vm.id, &vm.name, os_type, wait_glyph, self.settings.timeout)
            .await
    }

    pub async fn verify_table(&self, query: &VerificationQuery) -> Result<bool, EngineError> {
        self.verifier.verify_table(query).await
    }
}
