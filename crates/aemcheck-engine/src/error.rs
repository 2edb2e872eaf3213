use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage account '{0}' not found")]
    AccountNotFound(String),

    #[error("could not determine storage account from uri '{0}'")]
    MalformedUri(String),

    #[error("cannot find resource group name in resource id '{0}'")]
    MalformedResourceId(String),

    #[error("unknown disk size for premium storage: {0} GB")]
    UnknownDiskTier(i64),

    #[error("no account type for storage account '{0}'")]
    MissingAccountType(String),

    #[error("storage account '{0}' returned no access keys")]
    NoAccessKeys(String),

    #[error("SAS validity of {0:?} does not fit a blob expiry")]
    SasValidityOutOfRange(std::time::Duration),

    #[error("unknown OS type: {0}")]
    UnknownOsType(String),

    #[error("driver error: {0}")]
    Driver(#[from] aemcheck_driver::DriverError),
}
