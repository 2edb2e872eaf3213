pub mod audit;
pub mod clock;
pub mod directory;
pub mod disk;
pub mod engine;
pub mod error;
pub mod extension;
pub mod sink;
pub mod sla;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{audit_monitoring_xml, check_named_property, get_property_value, ConfigAuditor};
pub use clock::{Clock, SystemClock};
pub use directory::{account_name_from_uri, resource_group_from_id, AccountDirectory};
pub use disk::DiskSizeResolver;
pub use engine::MonitoringEngine;
pub use error::EngineError;
pub use extension::{find_extension, find_extension_status};
pub use sink::{HostColor, HostStyle, MemorySink, OutputSink, Reporter, SinkMessage};
pub use verify::{DiagnosticsVerifier, PollState, TableSelector, VerificationQuery};
