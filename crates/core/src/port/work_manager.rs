// Work Substrate Port
//
// The three operations the Scheduler needs from whatever executes background
// work. Implementations must honor per-name single-instance semantics and keep
// registrations across process restarts.

use crate::domain::{ConflictPolicy, JobName, JobPayload, RegisterOutcome};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait WorkManager: Send + Sync {
    /// Register a recurring job under `name`. Intervals below the substrate
    /// minimum are clamped up silently.
    async fn enqueue_periodic(
        &self,
        name: JobName,
        interval: Duration,
        policy: ConflictPolicy,
    ) -> Result<RegisterOutcome>;

    /// Register a single execution under `name`, delivered with `payload`
    async fn enqueue_once(
        &self,
        name: JobName,
        payload: JobPayload,
        policy: ConflictPolicy,
    ) -> Result<RegisterOutcome>;

    /// Prevent future firings of `name`. Idempotent; an execution already in
    /// progress is not interrupted.
    async fn cancel(&self, name: JobName) -> Result<()>;
}
