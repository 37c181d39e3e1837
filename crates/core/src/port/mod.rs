// Port Layer - Interfaces for external collaborators

pub mod foreground;
pub mod id_provider; // For deterministic testing
pub mod job_registry;
pub mod sync_task;
pub mod time_provider;
pub mod work_manager;

// Re-exports
pub use foreground::ForegroundOracle;
pub use id_provider::IdProvider;
pub use job_registry::JobRegistry;
pub use sync_task::{SyncTask, SyncTaskError};
pub use time_provider::TimeProvider;
pub use work_manager::WorkManager;
