//! Virtual machine descriptor, in the JSON shape `az vm show` and
//! `az vm get-instance-view` produce.

use serde::{Deserialize, Serialize};

use crate::types::{DiskDescriptor, OsType};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    pub hardware_profile: HardwareProfile,
    #[serde(default)]
    pub storage_profile: StorageProfile,
    /// Extensions installed on the VM.
    #[serde(default)]
    pub resources: Vec<ExtensionRef>,
}

impl VirtualMachine {
    pub fn os_type(&self) -> Option<OsType> {
        self.storage_profile.os_disk.as_ref().and_then(|d| d.os_type)
    }

    /// OS disk first, then data disks ordered by LUN. Managed disks without a
    /// backing VHD are skipped.
    pub fn disks(&self) -> Vec<DiskDescriptor> {
        let mut out = Vec::new();
        if let Some(d) = self.storage_profile.os_disk.as_ref().and_then(OsDisk::descriptor) {
            out.push(d);
        }
        let mut data: Vec<&DataDisk> = self.storage_profile.data_disks.iter().collect();
        data.sort_by_key(|d| d.lun);
        out.extend(data.into_iter().filter_map(DataDisk::descriptor));
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    pub vm_size: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    pub os_disk: Option<OsDisk>,
    #[serde(default)]
    pub data_disks: Vec<DataDisk>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHardDisk {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    #[serde(default)]
    pub name: String,
    pub os_type: Option<OsType>,
    #[serde(alias = "diskSizeGB")]
    pub disk_size_gb: Option<i64>,
    pub vhd: Option<VirtualHardDisk>,
}

impl OsDisk {
    pub fn descriptor(&self) -> Option<DiskDescriptor> {
        self.vhd.as_ref().map(|v| DiskDescriptor {
            declared_size_gb: self.disk_size_gb,
            backing_uri: v.uri.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    pub lun: i32,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "diskSizeGB")]
    pub disk_size_gb: Option<i64>,
    pub vhd: Option<VirtualHardDisk>,
}

impl DataDisk {
    pub fn descriptor(&self) -> Option<DiskDescriptor> {
        self.vhd.as_ref().map(|v| DiskDescriptor {
            declared_size_gb: self.disk_size_gb,
            backing_uri: v.uri.clone(),
        })
    }
}

/// An extension entry from the VM's `resources` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRef {
    pub name: String,
    pub publisher: String,
    /// `az` flattens the extension's `properties.type` into `typePropertiesType`
    /// because the resource already has a `type`.
    #[serde(rename = "typePropertiesType", alias = "virtualMachineExtensionType")]
    pub extension_type: String,
    pub type_handler_version: Option<String>,
    /// Public settings, stored opaquely.
    #[serde(default)]
    pub settings: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceView {
    #[serde(default)]
    pub extensions: Vec<ExtensionInstanceView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionInstanceView {
    pub name: String,
    #[serde(rename = "type")]
    pub extension_type: Option<String>,
    pub type_handler_version: Option<String>,
    #[serde(default)]
    pub statuses: Vec<InstanceViewStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceViewStatus {
    pub code: Option<String>,
    pub level: Option<String>,
    pub display_status: Option<String>,
    pub message: Option<String>,
}
