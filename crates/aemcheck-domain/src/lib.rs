pub mod error;
pub mod filter;
pub mod storage;
pub mod types;
pub mod vm;


pub use error::DomainError;
pub use filter::TableFilter;
pub use storage::{LoggingOperations, LoggingProperties, MetricsLevel, MetricsProperties, ServiceProperties};
pub use types::*;
pub use vm::{
    DataDisk, ExtensionInstanceView, ExtensionRef, HardwareProfile, InstanceViewStatus, OsDisk,
    StorageProfile, VirtualHardDisk, VirtualMachine, VirtualMachineInstanceView,
};
