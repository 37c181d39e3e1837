//! Scheduler - public entry point for registering the channel sync jobs
//!
//! - Periodic: one recurring registration, every `PERIODIC_INTERVAL`
//! - One-shot: one immediate run, tagged so the gate never defers it
//!
//! Both use `ConflictPolicy::Keep`, so repeated calls never stack work.

use crate::application::dispatcher::constants::PERIODIC_INTERVAL;
use crate::domain::{ConflictPolicy, JobName, JobPayload, RegisterOutcome};
use crate::error::Result;
use crate::port::WorkManager;
use std::sync::Arc;
use tracing::{debug, info};

/// What `schedule` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Capability or feature switch off; nothing touched
    NotEligible,
    Registered {
        periodic: RegisterOutcome,
        one_shot: RegisterOutcome,
    },
}

/// What `cancel` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    NotEligible,
    Cancelled,
}

/// Scheduler decides whether the sync jobs get registered
pub struct Scheduler {
    work_manager: Arc<dyn WorkManager>,
}

impl Scheduler {
    pub fn new(work_manager: Arc<dyn WorkManager>) -> Self {
        Self { work_manager }
    }

    /// Register the periodic job and the one-shot job, each only if its slot
    /// is empty. No-op unless both `capability_available` and
    /// `feature_enabled` hold.
    pub async fn schedule(
        &self,
        capability_available: bool,
        feature_enabled: bool,
    ) -> Result<ScheduleOutcome> {
        if !Self::is_eligible(capability_available, feature_enabled) {
            debug!(
                capability_available,
                feature_enabled, "Schedule skipped: not eligible"
            );
            return Ok(ScheduleOutcome::NotEligible);
        }

        // Independent registrations: a running periodic job does not block
        // the one-shot and vice versa.
        let periodic = self
            .work_manager
            .enqueue_periodic(JobName::Periodic, PERIODIC_INTERVAL, ConflictPolicy::Keep)
            .await?;

        let one_shot = self
            .work_manager
            .enqueue_once(
                JobName::OneShot,
                JobPayload::origin(JobName::OneShot),
                ConflictPolicy::Keep,
            )
            .await?;

        info!(
            periodic = %periodic,
            one_shot = %one_shot,
            "Channel sync jobs scheduled"
        );
        Ok(ScheduleOutcome::Registered { periodic, one_shot })
    }

    /// Stop future periodic firings. The one-shot slot is left alone; it
    /// clears itself once it has run.
    pub async fn cancel(
        &self,
        capability_available: bool,
        feature_enabled: bool,
    ) -> Result<CancelOutcome> {
        if !Self::is_eligible(capability_available, feature_enabled) {
            debug!(
                capability_available,
                feature_enabled, "Cancel skipped: not eligible"
            );
            return Ok(CancelOutcome::NotEligible);
        }

        info!("Unregistering channel sync job...");
        self.work_manager.cancel(JobName::Periodic).await?;
        Ok(CancelOutcome::Cancelled)
    }

    fn is_eligible(capability_available: bool, feature_enabled: bool) -> bool {
        capability_available && feature_enabled
    }
}
