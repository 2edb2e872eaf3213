mod raw;
mod loader;
pub mod error;
pub mod settings;

pub use loader::{load_instance_view, load_settings, load_vm};
pub use error::ConfigError;
pub use settings::Settings;
