pub mod arm;
pub mod data_plane;
pub mod directory;
pub mod error;
pub mod signing;
pub mod storage;
pub mod token;
pub mod xml;

pub use arm::{ArmDirectoryConfig, ArmStorageDirectory};
pub use data_plane::{StorageContext, StorageDataPlane};
pub use directory::StorageDirectory;
pub use error::DriverError;
pub use storage::AzureStorageDataPlane;
pub use token::{StaticToken, TokenProvider};
