//! Static configuration checks: the WAD XML, storage analytics settings
//! and named extension properties.

use std::sync::Arc;

use aemcheck_config::Settings;
use aemcheck_domain::{AuditResult, LoggingOperations, MetricsLevel, ServiceProperties};
use aemcheck_driver::xml::XmlElement;
use aemcheck_driver::StorageDataPlane;
use serde_json::Value;
use tracing::debug;

use crate::directory::AccountDirectory;
use crate::error::EngineError;
use crate::sink::{HostColor, HostStyle, Reporter};

const DIAGNOSTIC_MONITOR: &str = "/WadCfg/DiagnosticMonitorConfiguration";
const PERFORMANCE_COUNTERS: &str = "/WadCfg/DiagnosticMonitorConfiguration/PerformanceCounters";
const PERFORMANCE_COUNTER_CONFIGURATION: &str =
    "/WadCfg/DiagnosticMonitorConfiguration/PerformanceCounters/PerformanceCounterConfiguration";

pub struct ConfigAuditor {
    accounts: Arc<AccountDirectory>,
    data_plane: Arc<dyn StorageDataPlane>,
    reporter: Reporter,
    settings: Arc<Settings>,
}

impl ConfigAuditor {
    pub fn new(
        accounts: Arc<AccountDirectory>,
        data_plane: Arc<dyn StorageDataPlane>,
        reporter: Reporter,
        settings: Arc<Settings>,
    ) -> Self {
        Self { accounts, data_plane, reporter, settings }
    }

    pub fn audit_monitoring_xml(&self, doc: Option<&str>) -> bool {
        audit_monitoring_xml(doc, &self.settings)
    }

    /// Blob service analytics must log every operation and keep minute
    /// metrics. Advisory: the outcome is reported, never raised.
    pub fn audit_service_metrics(&self, account_name: &str, props: Option<&ServiceProperties>) -> bool {
        let ok = props.is_some_and(|p| {
            let logging_ok = p
                .logging
                .as_ref()
                .is_some_and(|l| l.operations.contains(LoggingOperations::ALL));
            let metrics_ok = p.minute_metrics.as_ref().is_some_and(|m| {
                m.level > MetricsLevel::None && m.retention_days.map_or(true, |d| d >= 0)
            });
            logging_ok && metrics_ok
        });

        if ok {
            self.reporter
                .verbose(&format!("Storage account {} has required metrics enabled", account_name));
        } else {
            self.reporter.verbose(&format!(
                "Storage account {} does not have the required metrics enabled",
                account_name
            ));
        }
        ok
    }

    /// Current blob service analytics settings of the account.
    pub async fn fetch_service_metrics(&self, account_name: &str) -> Result<ServiceProperties, EngineError> {
        let ctx = self.accounts.storage_context(account_name).await?;
        Ok(self.data_plane.service_properties(&ctx).await?)
    }

    pub fn check_named_property(
        &self,
        label: &str,
        property: &str,
        doc: Option<&Value>,
        expected: Option<&str>,
        existence_only: bool,
        parent: &mut AuditResult,
    ) {
        check_named_property(&self.reporter, label, property, doc, expected, existence_only, parent)
    }
}

/// True when the WAD configuration collects performance counters with a
/// one-minute transfer period and a large enough local quota.
pub fn audit_monitoring_xml(doc: Option<&str>, settings: &Settings) -> bool {
    let Some(doc) = doc else {
        return false;
    };
    let root = match XmlElement::parse(doc) {
        Ok(root) => root,
        Err(e) => {
            debug!(error = %e, "WAD configuration is not valid XML");
            return false;
        }
    };

    let quota_ok = root
        .select_value(&format!("{}/@overallQuotaInMB", DIAGNOSTIC_MONITOR))
        .and_then(|q| q.trim().parse::<i64>().ok())
        .is_some_and(|q| q >= settings.min_quota_mb);
    let transfer_ok = root
        .select_value(&format!("{}/@scheduledTransferPeriod", PERFORMANCE_COUNTERS))
        .is_some_and(|p| p.eq_ignore_ascii_case(&settings.transfer_period));

    root.select(DIAGNOSTIC_MONITOR).is_some()
        && quota_ok
        && root.select(PERFORMANCE_COUNTERS).is_some()
        && transfer_ok
        && root.select(PERFORMANCE_COUNTER_CONFIGURATION).is_some()
}

/// Check one `cfg` entry of an extension's settings and record the outcome
/// on `parent`.
///
/// With `existence_only`, a present value records a pass and then the
/// regular comparison runs as well, so a present value with no expected
/// value records two passes.
pub fn check_named_property(
    reporter: &Reporter,
    label: &str,
    property: &str,
    doc: Option<&Value>,
    expected: Option<&str>,
    existence_only: bool,
    parent: &mut AuditResult,
) {
    let value = get_property_value(property, doc).filter(|v| !v.is_empty());
    let expected = expected.filter(|e| !e.is_empty());
    reporter.host(&format!("{}...", label), HostStyle::INLINE);

    if existence_only && value.is_some() {
        record_pass(reporter, label, parent);
    }

    let matches = match (value.as_deref(), expected) {
        (Some(_), None) => true,
        (Some(v), Some(e)) => v == e,
        (None, _) => false,
    };
    if matches {
        record_pass(reporter, label, parent);
    } else {
        parent.push(label, false);
        reporter.host("NOT OK ", HostStyle::colored(HostColor::Red));
    }
}

fn record_pass(reporter: &Reporter, label: &str, parent: &mut AuditResult) {
    parent.push(label, true);
    reporter.host("OK ", HostStyle::colored(HostColor::Green));
}

/// String `value` of the `cfg` entry whose `key` is `property`.
pub fn get_property_value(property: &str, doc: Option<&Value>) -> Option<String> {
    doc?["cfg"]
        .as_array()?
        .iter()
        .find(|entry| entry["key"].as_str() == Some(property))?["value"]
        .as_str()
        .map(str::to_string)
}
