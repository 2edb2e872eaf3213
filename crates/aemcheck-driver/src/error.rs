use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("{url}: status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}

impl DriverError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriverError::NotFound(_))
    }
}
