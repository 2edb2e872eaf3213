use async_trait::async_trait;
use aemcheck_domain::ServiceProperties;
use serde_json::Value;

use crate::error::DriverError;

/// Everything needed to address and authenticate against one account's
/// blob and table services.
#[derive(Clone)]
pub struct StorageContext {
    pub account_name: String,
    /// Base64 account key.
    pub key: String,
    /// e.g. `https://acct.blob.core.windows.net`
    pub blob_base: String,
    /// e.g. `https://acct.table.core.windows.net`
    pub table_base: String,
}

impl StorageContext {
    pub fn new(account_name: &str, key: &str, endpoint_suffix: &str) -> Self {
        Self {
            account_name: account_name.to_string(),
            key: key.to_string(),
            blob_base: format!("https://{}.blob.{}", account_name, endpoint_suffix),
            table_base: format!("https://{}.table.{}", account_name, endpoint_suffix),
        }
    }

    /// Point both services at explicit base URLs (emulators, tests).
    pub fn with_endpoints(account_name: &str, key: &str, blob_base: &str, table_base: &str) -> Self {
        Self {
            account_name: account_name.to_string(),
            key: key.to_string(),
            blob_base: blob_base.trim_end_matches('/').to_string(),
            table_base: table_base.trim_end_matches('/').to_string(),
        }
    }
}

impl std::fmt::Debug for StorageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageContext")
            .field("account_name", &self.account_name)
            .field("key", &"<redacted>")
            .field("blob_base", &self.blob_base)
            .field("table_base", &self.table_base)
            .finish()
    }
}

/// Data-plane calls the verifier issues against a storage account.
#[async_trait]
pub trait StorageDataPlane: Send + Sync + 'static {
    /// Byte length of a blob. `blob_url` must already carry a SAS query.
    async fn blob_length(&self, blob_url: &str) -> Result<u64, DriverError>;

    /// Table names in the order the service lists them (lexical).
    async fn list_tables(&self, ctx: &StorageContext) -> Result<Vec<String>, DriverError>;

    async fn table_exists(&self, ctx: &StorageContext, table: &str) -> Result<bool, DriverError>;

    /// Rows matching an OData filter. Returns `DriverError::NotFound` when the
    /// table does not exist.
    async fn query_entities(
        &self,
        ctx: &StorageContext,
        table: &str,
        filter: &str,
        top: Option<u32>,
    ) -> Result<Vec<Value>, DriverError>;

    /// Blob service analytics settings.
    async fn service_properties(&self, ctx: &StorageContext) -> Result<ServiceProperties, DriverError>;
}
