use std::path::Path;
use std::time::Duration;

use aemcheck_domain::{OsType, VirtualMachine, VirtualMachineInstanceView};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawSettings;
use crate::settings::Settings;

/// Load engine settings from a YAML file. Fields absent from the file keep
/// their defaults.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = read(path)?;
    let raw: RawSettings = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!("Loaded settings from {}", path.display());
    convert_settings(raw, path)
}

/// Load a VM descriptor as emitted by `az vm show -o json`.
pub fn load_vm(path: &Path) -> Result<VirtualMachine, ConfigError> {
    let vm: VirtualMachine = read_json(path)?;
    if vm.hardware_profile.vm_size.is_empty() {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!("VM '{}' has no hardwareProfile.vmSize", vm.name),
        });
    }
    Ok(vm)
}

/// Load a VM instance view as emitted by `az vm get-instance-view`.
///
/// Accepts either the bare instance view or a full VM document carrying it
/// under `instanceView`.
pub fn load_instance_view(path: &Path) -> Result<VirtualMachineInstanceView, ConfigError> {
    let value: serde_json::Value = read_json(path)?;
    let view = match value.get("instanceView") {
        Some(inner) => inner.clone(),
        None => value,
    };
    serde_json::from_value(view).map_err(|e| ConfigError::JsonParse {
        path: path.display().to_string(),
        source: e,
    })
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = read(path)?;
    serde_json::from_str(&content).map_err(|e| ConfigError::JsonParse {
        path: path.display().to_string(),
        source: e,
    })
}

fn convert_settings(raw: RawSettings, path: &Path) -> Result<Settings, ConfigError> {
    let mut settings = Settings::default();

    if let Some(suffix) = raw.default_endpoint_suffix {
        settings.default_endpoint_suffix = suffix;
    }
    if let Some(secs) = raw.poll_interval_secs {
        if secs == 0 {
            return Err(conversion(path, "poll_interval_secs must be greater than zero"));
        }
        settings.poll_interval = Duration::from_secs(secs);
    }
    if let Some(mins) = raw.timeout_minutes {
        if mins == 0 {
            return Err(conversion(path, "timeout_minutes must be greater than zero"));
        }
        settings.timeout = scaled(path, "timeout_minutes", mins, 60)?;
    }
    if let Some(mins) = raw.search_window_minutes {
        settings.search_window = scaled(path, "search_window_minutes", mins, 60)?;
    }
    if let Some(prefix) = raw.metrics_table_prefix {
        settings.metrics_table_prefix = prefix;
    }
    for (os, tables) in raw.diagnostics_tables {
        let os: OsType = os.parse()?;
        if tables.is_empty() {
            return Err(conversion(
                path,
                &format!("diagnostics_tables.{} must list at least one table", os),
            ));
        }
        settings.diagnostics_tables.insert(os, tables);
    }
    if let Some(quota) = raw.min_quota_mb {
        settings.min_quota_mb = quota;
    }
    if let Some(period) = raw.transfer_period {
        settings.transfer_period = period;
    }
    if let Some(hours) = raw.sas_validity_hours {
        settings.sas_validity = scaled(path, "sas_validity_hours", hours, 60 * 60)?;
    }

    Ok(settings)
}

/// `value` units of `unit_secs` seconds each, rejecting overflow.
fn scaled(path: &Path, field: &str, value: u64, unit_secs: u64) -> Result<Duration, ConfigError> {
    value
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| conversion(path, &format!("{} is out of range", field)))
}

fn conversion(path: &Path, message: &str) -> ConfigError {
    ConfigError::Conversion {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}
