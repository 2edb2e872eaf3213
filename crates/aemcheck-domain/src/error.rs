use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown os type '{0}' (expected 'Linux' or 'Windows')")]
    UnknownOsType(String),
}
