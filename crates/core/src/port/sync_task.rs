// Sync Task Port
// The routine that actually publishes channels; opaque to the scheduler.

use async_trait::async_trait;
use thiserror::Error;

/// Failures raised by a sync run. Caught at the execution gate and never
/// surfaced as scheduling failures.
#[derive(Error, Debug)]
pub enum SyncTaskError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Sync timed out after {0}ms")]
    Timeout(u64),

    #[error("Sync exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Sync failed: {0}")]
    Failed(String),
}

/// Sync Task trait
///
/// Implementations:
/// - SubprocessSyncTask: runs the configured sync command
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncTask: Send + Sync {
    /// Perform one synchronization pass. May block for the length of the
    /// run; any deadline is the implementation's own business.
    async fn run(&self) -> Result<(), SyncTaskError>;
}

// ============================================================================
// Scripted implementation for testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    pub enum SyncBehavior {
        /// Always succeed
        Success,
        /// Always fail with message
        Fail(String),
        /// Panic with message (for gate isolation testing)
        Panic(String),
        /// Succeed after sleeping
        Slow(Duration),
    }

    /// Sync task that follows a script and counts its runs
    pub struct ScriptedSyncTask {
        behavior: Mutex<SyncBehavior>,
        runs: AtomicUsize,
    }

    impl ScriptedSyncTask {
        pub fn new(behavior: SyncBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                runs: AtomicUsize::new(0),
            }
        }

        pub fn succeeding() -> Self {
            Self::new(SyncBehavior::Success)
        }

        pub fn failing(message: impl Into<String>) -> Self {
            Self::new(SyncBehavior::Fail(message.into()))
        }

        pub fn panicking(message: impl Into<String>) -> Self {
            Self::new(SyncBehavior::Panic(message.into()))
        }

        pub fn set_behavior(&self, behavior: SyncBehavior) {
            if let Ok(mut current) = self.behavior.lock() {
                *current = behavior;
            }
        }

        pub fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SyncTask for ScriptedSyncTask {
        async fn run(&self) -> Result<(), SyncTaskError> {
            self.runs.fetch_add(1, Ordering::SeqCst);

            let behavior = self
                .behavior
                .lock()
                .map(|b| b.clone())
                .unwrap_or(SyncBehavior::Success);

            match behavior {
                SyncBehavior::Success => Ok(()),
                SyncBehavior::Fail(msg) => Err(SyncTaskError::Failed(msg)),
                SyncBehavior::Panic(msg) => panic!("{}", msg),
                SyncBehavior::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
            }
        }
    }
}
