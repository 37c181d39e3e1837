// Registry-backed work substrate
//
// Turns the Scheduler's enqueue/cancel calls into registry entries with
// injected instance ids and timestamps.

use crate::application::dispatcher::constants::MIN_PERIODIC_INTERVAL;
use crate::domain::{
    ConflictPolicy, JobKind, JobName, JobPayload, JobRequest, RegisterOutcome, Registration,
};
use crate::error::Result;
use crate::port::{IdProvider, JobRegistry, TimeProvider, WorkManager};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct RegistryWorkManager {
    registry: Arc<dyn JobRegistry>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RegistryWorkManager {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            registry,
            id_provider,
            time_provider,
        }
    }

    async fn submit(&self, request: JobRequest, policy: ConflictPolicy) -> Result<RegisterOutcome> {
        let name = request.name;
        let registration = Registration::new(
            self.id_provider.instance_id(),
            request,
            self.time_provider.now_millis(),
        );
        let instance_id = registration.instance_id.clone();

        let outcome = self.registry.register_if_absent(registration, policy).await?;

        info!(
            job = %name,
            policy = %policy,
            outcome = %outcome,
            instance_id = %instance_id,
            "Registration submitted"
        );
        Ok(outcome)
    }
}

/// Substrate floor for repeat intervals
pub fn clamp_interval(interval: Duration) -> Duration {
    interval.max(MIN_PERIODIC_INTERVAL)
}

#[async_trait]
impl WorkManager for RegistryWorkManager {
    async fn enqueue_periodic(
        &self,
        name: JobName,
        interval: Duration,
        policy: ConflictPolicy,
    ) -> Result<RegisterOutcome> {
        let clamped = clamp_interval(interval);
        if clamped != interval {
            debug!(
                job = %name,
                requested_secs = interval.as_secs(),
                clamped_secs = clamped.as_secs(),
                "Periodic interval clamped to substrate minimum"
            );
        }

        let request = JobRequest::new(
            name,
            JobKind::Periodic { interval: clamped },
            JobPayload::new(),
        )?;
        self.submit(request, policy).await
    }

    async fn enqueue_once(
        &self,
        name: JobName,
        payload: JobPayload,
        policy: ConflictPolicy,
    ) -> Result<RegisterOutcome> {
        let request = JobRequest::new(name, JobKind::OneShot, payload)?;
        self.submit(request, policy).await
    }

    async fn cancel(&self, name: JobName) -> Result<()> {
        let removed = self.registry.cancel(name).await?;
        info!(job = %name, removed = removed, "Cancelled job slot");
        Ok(())
    }
}
