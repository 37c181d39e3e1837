// Crash recovery for wedged job slots
use crate::error::Result;
use crate::port::{JobRegistry, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::dispatcher::constants::DEFAULT_RECOVERY_WINDOW_MS;

/// Startup recovery service
///
/// A registration stays Running only while a dispatcher executes it. If the
/// process died mid-run the row would hold its slot forever, so on startup
/// anything Running for longer than the recovery window is put back in line.
pub struct RecoveryService {
    registry: Arc<dyn JobRegistry>,
    time_provider: Arc<dyn TimeProvider>,
    recovery_window_ms: i64,
}

impl RecoveryService {
    /// # Arguments
    /// * `registry` - Job registry
    /// * `time_provider` - Time provider
    /// * `recovery_window_ms` - Optional custom recovery window (default: 30 minutes)
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        time_provider: Arc<dyn TimeProvider>,
        recovery_window_ms: Option<i64>,
    ) -> Self {
        Self {
            registry,
            time_provider,
            recovery_window_ms: recovery_window_ms.unwrap_or(DEFAULT_RECOVERY_WINDOW_MS),
        }
    }

    /// Requeue orphaned runs. Returns how many registrations were recovered.
    pub async fn recover_orphaned_runs(&self) -> Result<usize> {
        let now = self.time_provider.now_millis();
        let cutoff = now - self.recovery_window_ms;

        info!(
            cutoff_time = %cutoff,
            recovery_window_ms = %self.recovery_window_ms,
            "Starting orphaned run recovery"
        );

        let requeued = self.registry.requeue_stale(cutoff, now).await?;
        for registration in &requeued {
            warn!(
                job = %registration.name(),
                instance_id = %registration.instance_id,
                "Orphaned run requeued"
            );
        }

        info!(recovered_count = requeued.len(), "Orphaned run recovery complete");
        Ok(requeued.len())
    }
}
