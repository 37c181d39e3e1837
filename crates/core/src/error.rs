// Central Error Type for scheduling operations

use thiserror::Error;

/// Errors surfaced to callers of `schedule` / `cancel` and to the dispatcher.
///
/// Never retried by the core; retry belongs to whoever drives the substrate.
#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Substrate unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using SchedulingError
pub type Result<T> = std::result::Result<T, SchedulingError>;

// Storage adapters hand over their own error text (sqlx lives in infra-sqlite)
impl From<String> for SchedulingError {
    fn from(err: String) -> Self {
        SchedulingError::Storage(err)
    }
}
