use async_trait::async_trait;
use aemcheck_domain::StorageAccountRef;

use crate::error::DriverError;

/// Control-plane view of the storage accounts in the current scope.
#[async_trait]
pub trait StorageDirectory: Send + Sync + 'static {
    /// Every storage account visible in the scope. One round trip per page.
    async fn list_accounts(&self) -> Result<Vec<StorageAccountRef>, DriverError>;

    /// Access keys for one account, primary first.
    async fn list_keys(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> Result<Vec<String>, DriverError>;
}
