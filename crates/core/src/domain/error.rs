// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid registration state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown job name: {0}")]
    UnknownJobName(String),

    #[error("Unknown registration state: {0}")]
    UnknownState(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
