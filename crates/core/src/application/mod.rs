// Application Layer - Use Cases

pub mod dispatcher;
pub mod gate;
pub mod recovery;
pub mod scheduler;
pub mod work_manager;

// Re-exports
pub use dispatcher::{
    shutdown_channel, DispatchReport, Dispatcher, DispatcherConfig, ShutdownSender, ShutdownToken,
};
pub use gate::{ExecutionGate, GateDecision, RunReport};
pub use recovery::RecoveryService;
pub use scheduler::{CancelOutcome, ScheduleOutcome, Scheduler};
pub use work_manager::RegistryWorkManager;
