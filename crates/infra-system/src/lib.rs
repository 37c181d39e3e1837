// chansync Infrastructure - System Adapters
// Implements: ForegroundOracle, SyncTask

pub mod foreground;
pub mod subprocess_sync_task;

pub use foreground::{ForegroundFlag, ProcessForegroundOracle};
pub use subprocess_sync_task::SubprocessSyncTask;
