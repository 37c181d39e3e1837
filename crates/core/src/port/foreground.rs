// Foreground-state port
use async_trait::async_trait;

/// Point-in-time answer to "is the host application in the foreground?"
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForegroundOracle: Send + Sync {
    async fn is_foreground(&self) -> bool;
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Oracle whose answer is set by the test
    pub struct StaticForeground {
        foreground: AtomicBool,
    }

    impl StaticForeground {
        pub fn new(foreground: bool) -> Self {
            Self {
                foreground: AtomicBool::new(foreground),
            }
        }

        pub fn set(&self, foreground: bool) {
            self.foreground.store(foreground, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ForegroundOracle for StaticForeground {
        async fn is_foreground(&self) -> bool {
            self.foreground.load(Ordering::SeqCst)
        }
    }
}
