use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aemcheck_config::{load_instance_view, load_settings, load_vm, Settings};
use aemcheck_domain::AuditResult;
use aemcheck_driver::{ArmDirectoryConfig, ArmStorageDirectory, AzureStorageDataPlane};
use aemcheck_engine::{
    audit_monitoring_xml, check_named_property, find_extension, find_extension_status, HostColor,
    HostStyle, MonitoringEngine, OutputSink, Reporter, SystemClock, TableSelector, VerificationQuery,
};
use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{AzureArgs, OsTypeArg};
use crate::output;

const WAIT_GLYPH: &str = ".";

// ── Setup ─────────────────────────────────────────────────────────────────────

pub fn settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => load_settings(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(Settings::default()),
    }
}

fn engine(azure: &AzureArgs, settings: Settings, sink: Arc<dyn OutputSink>) -> Result<MonitoringEngine> {
    let subscription_id = azure
        .subscription_id
        .clone()
        .context("--subscription-id (or AZURE_SUBSCRIPTION_ID) is required for this command")?;
    let directory = ArmStorageDirectory::new(ArmDirectoryConfig {
        subscription_id,
        tenant_id: azure.tenant_id.clone(),
        client_id: azure.client_id.clone(),
        client_secret: azure.client_secret.clone(),
    })
    .context("Failed to set up the ARM storage account directory")?;

    Ok(MonitoringEngine::new(
        Arc::new(directory),
        Arc::new(AzureStorageDataPlane::new()),
        sink,
        Arc::new(SystemClock),
        settings,
    ))
}

fn minutes(m: u64) -> Result<Duration> {
    m.checked_mul(60)
        .map(Duration::from_secs)
        .with_context(|| format!("--timeout-minutes {} is out of range", m))
}

fn report_line(reporter: &Reporter, label: &str, ok: bool) {
    reporter.host(&format!("{}...", label), HostStyle::INLINE);
    if ok {
        reporter.host("OK", HostStyle::colored(HostColor::Green));
    } else {
        reporter.host("NOT OK", HostStyle::colored(HostColor::Red));
    }
}

// ── SLA ───────────────────────────────────────────────────────────────────────

pub async fn sla(azure: &AzureArgs, settings: Settings, sink: Arc<dyn OutputSink>, vm: PathBuf) -> Result<bool> {
    let vm = load_vm(&vm).with_context(|| format!("Failed to load VM from {}", vm.display()))?;
    let engine = engine(azure, settings, sink)?;

    let vm_sla = engine.vm_sla(&vm);
    let disks = engine
        .disk_slas(&vm)
        .await
        .with_context(|| format!("Failed to compute disk SLAs for VM {}", vm.name))?;
    print!("{}", output::render_sla(&vm.name, &vm.hardware_profile.vm_size, &vm_sla, &disks));
    Ok(true)
}

// ── Verification ──────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub async fn verify(
    azure: &AzureArgs,
    mut settings: Settings,
    sink: Arc<dyn OutputSink>,
    vm: PathBuf,
    account: String,
    os_type: Option<OsTypeArg>,
    timeout_minutes: Option<u64>,
    deployment_id: Option<String>,
    host: Option<String>,
) -> Result<bool> {
    let vm = load_vm(&vm).with_context(|| format!("Failed to load VM from {}", vm.display()))?;
    if let Some(m) = timeout_minutes {
        settings.timeout = minutes(m)?;
    }
    let engine = engine(azure, settings, sink)?;

    let outcome = if os_type.is_none() && deployment_id.is_none() && host.is_none() {
        engine.verify_diagnostics_for_vm(&vm, &account, WAIT_GLYPH).await
    } else {
        let os_type = match os_type {
            Some(os) => os.into(),
            None => vm
                .os_type()
                .with_context(|| format!("VM {} reports no OS type; pass --os-type", vm.name))?,
        };
        let deployment_id = deployment_id.as_deref().unwrap_or(&vm.id);
        let host = host.as_deref().unwrap_or(&vm.name);
        info!(deployment_id, host, %os_type, "verifying with overridden identity");
        engine
            .verifier()
            .verify_diagnostics(&account, deployment_id, host, os_type, WAIT_GLYPH, engine.settings().timeout)
            .await
    };
    let result = outcome
        .with_context(|| format!("Diagnostics verification against account {} failed", account))?;

    println!();
    print!("{}", output::render_verification(&result));
    Ok(result.succeeded)
}

pub async fn wait_table(
    azure: &AzureArgs,
    settings: Settings,
    sink: Arc<dyn OutputSink>,
    account: String,
    table: Option<String>,
    filter: String,
    timeout_minutes: Option<u64>,
) -> Result<bool> {
    let table = match table {
        Some(name) => TableSelector::Named(name),
        None => TableSelector::FirstMatchByPrefix(settings.metrics_table_prefix.clone()),
    };
    let timeout = match timeout_minutes {
        Some(m) => minutes(m)?,
        None => settings.timeout,
    };
    let engine = engine(azure, settings, sink)?;

    let query = VerificationQuery {
        account_name: account,
        table,
        filter,
        wait_glyph: WAIT_GLYPH.to_string(),
        timeout,
    };
    let found = engine
        .verify_table(&query)
        .await
        .with_context(|| format!("Table check against account {} failed", query.account_name))?;

    println!();
    report_line(engine.reporter(), "Matching entity", found);
    Ok(found)
}

// ── Audits ────────────────────────────────────────────────────────────────────

pub fn audit_wad(settings: &Settings, sink: Arc<dyn OutputSink>, file: PathBuf) -> Result<bool> {
    let doc = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read WAD configuration from {}", file.display()))?;
    let ok = audit_monitoring_xml(Some(&doc), settings);
    report_line(&Reporter::new(sink), "WAD configuration", ok);
    Ok(ok)
}

pub async fn audit_storage(
    azure: &AzureArgs,
    settings: Settings,
    sink: Arc<dyn OutputSink>,
    account: String,
) -> Result<bool> {
    let engine = engine(azure, settings, sink)?;
    let props = engine
        .auditor()
        .fetch_service_metrics(&account)
        .await
        .with_context(|| format!("Failed to read service properties of account {}", account))?;
    let ok = engine.auditor().audit_service_metrics(&account, Some(&props));
    report_line(engine.reporter(), &format!("Storage analytics for {}", account), ok);
    Ok(ok)
}

#[allow(clippy::too_many_arguments)]
pub fn check_extension(
    sink: Arc<dyn OutputSink>,
    vm: PathBuf,
    view: Option<PathBuf>,
    extension_type: String,
    publisher: String,
    properties: Option<PathBuf>,
    key: String,
    label: Option<String>,
    expected: Option<String>,
    exists: bool,
) -> Result<bool> {
    let vm = load_vm(&vm).with_context(|| format!("Failed to load VM from {}", vm.display()))?;
    let reporter = Reporter::new(sink);

    let Some(ext) = find_extension(&vm, &extension_type, &publisher) else {
        reporter.error(&format!(
            "Extension {} from {} is not installed on VM {}",
            extension_type, publisher, vm.name
        ));
        return Ok(false);
    };

    if let Some(view) = view {
        let view = load_instance_view(&view)
            .with_context(|| format!("Failed to load instance view from {}", view.display()))?;
        match find_extension_status(&vm, &view, &extension_type, &publisher) {
            Some(status) => {
                let state = status
                    .statuses
                    .first()
                    .and_then(|s| s.display_status.as_deref().or(s.code.as_deref()))
                    .unwrap_or("unknown");
                reporter.host(&format!("Extension {} status: {}", ext.name, state), HostStyle::LINE);
            }
            None => reporter.warning(&format!("Extension {} reports no status", ext.name)),
        }
    }

    let doc: serde_json::Value = match properties {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("{} is not a JSON document", path.display()))?
        }
        None => ext.settings.clone(),
    };

    let label = label.unwrap_or_else(|| key.clone());
    let mut result = AuditResult::new(format!("Extension {}", ext.name));
    check_named_property(&reporter, &label, &key, Some(&doc), expected.as_deref(), exists, &mut result);
    result.passed = result.all_partials_passed();

    println!("{}", output::render_audit(&result));
    Ok(result.passed)
}
