// Domain Layer - Pure scheduling entities

pub mod error;
pub mod job;
pub mod registration;

// Re-exports
pub use error::DomainError;
pub use job::{ConflictPolicy, JobKind, JobName, JobPayload, JobRequest, WORK_NAME_KEY};
pub use registration::{
    FinishAction, InstanceId, RegisterOutcome, Registration, RegistrationState, RunOutcome,
};
