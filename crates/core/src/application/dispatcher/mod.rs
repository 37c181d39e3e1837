// Dispatcher - clock source that fires due registrations through the gate

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::gate::{ExecutionGate, RunReport};
use crate::application::recovery::RecoveryService;
use crate::domain::{FinishAction, InstanceId, JobName, Registration};
use crate::error::Result;
use crate::port::{JobRegistry, TimeProvider};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub poll_interval: Duration,
    /// Period of the orphaned-run sweep; only used with `with_recovery`
    pub recovery_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            recovery_interval: RECOVERY_SWEEP_INTERVAL,
        }
    }
}

/// Result of firing one registration
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub name: JobName,
    pub instance_id: InstanceId,
    pub run: RunReport,
    /// Registry follow-up; None when the instance was cancelled or replaced
    /// while it ran
    pub action: Option<FinishAction>,
}

pub struct Dispatcher {
    registry: Arc<dyn JobRegistry>,
    gate: Arc<ExecutionGate>,
    time_provider: Arc<dyn TimeProvider>,
    recovery: Option<Arc<RecoveryService>>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        gate: Arc<ExecutionGate>,
        time_provider: Arc<dyn TimeProvider>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry,
            gate,
            time_provider,
            recovery: None,
            config,
        }
    }

    /// Sweep for orphaned runs every `recovery_interval` while the loop runs.
    ///
    /// Rows left Running by a crash or by a failed `finish` would otherwise
    /// hold their slot until the next process start.
    pub fn with_recovery(mut self, recovery: Arc<RecoveryService>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Tick loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Dispatcher started"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // First sweep one interval in: startup recovery already ran
        let mut sweeper = interval_at(
            Instant::now() + self.config.recovery_interval,
            self.config.recovery_interval,
        );
        sweeper.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if shutdown.is_shutdown() {
                break;
            }

            let result = tokio::select! {
                _ = ticker.tick() => self.dispatch_due().await.map(|_| ()),
                _ = sweeper.tick(), if self.recovery.is_some() => {
                    self.recover_stale().await.map(|_| ())
                }
                _ = shutdown.wait() => {
                    info!("Dispatcher interrupted while idle");
                    break;
                }
            };

            if let Err(e) = result {
                error!(error = %e, "Dispatcher pass failed");
                tokio::select! {
                    _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                    _ = shutdown.wait() => {
                        info!("Dispatcher interrupted during error recovery");
                        break;
                    }
                }
            }
        }

        info!("Dispatcher stopped");
        Ok(())
    }

    /// Requeue orphaned runs now. Returns 0 when no recovery is attached.
    ///
    /// Runs between dispatch passes, so none of this dispatcher's own runs
    /// is in flight while it sweeps.
    pub async fn recover_stale(&self) -> Result<usize> {
        match &self.recovery {
            Some(recovery) => recovery.recover_orphaned_runs().await,
            None => Ok(0),
        }
    }

    /// Claim every due registration and run them (distinct names, so at most
    /// one run per slot) to completion.
    pub async fn dispatch_due(&self) -> Result<Vec<DispatchReport>> {
        let now = self.time_provider.now_millis();
        let claimed = self.registry.claim_due(now).await?;
        if claimed.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = claimed.len(), "Claimed due registrations");

        join_all(claimed.into_iter().map(|r| self.fire(r)))
            .await
            .into_iter()
            .collect()
    }

    async fn fire(&self, registration: Registration) -> Result<DispatchReport> {
        let name = registration.name();
        info!(
            job = %name,
            instance_id = %registration.instance_id,
            run_count = registration.run_count,
            "Firing job"
        );

        let run = self.gate.run(name, &registration.request.payload).await;

        let finished_at = self.time_provider.now_millis();
        let finished = self
            .registry
            .finish(&registration.instance_id, &run.outcome, finished_at)
            .await?;

        let action = match finished {
            None => {
                info!(
                    job = %name,
                    instance_id = %registration.instance_id,
                    "Registration cancelled or replaced during run"
                );
                None
            }
            Some((FinishAction::Clear, _)) => {
                info!(job = %name, outcome = run.outcome.label(), "Job slot cleared");
                Some(FinishAction::Clear)
            }
            Some((FinishAction::Rearm, updated)) => {
                debug!(
                    job = %name,
                    next_run_at = updated.next_run_at,
                    outcome = run.outcome.label(),
                    "Job re-armed"
                );
                if run.outcome.is_failure()
                    && updated.consecutive_failures >= FAILURE_WARN_THRESHOLD
                {
                    warn!(
                        job = %name,
                        consecutive_failures = updated.consecutive_failures,
                        last_error = ?updated.last_error,
                        "Channel sync keeps failing"
                    );
                }
                Some(FinishAction::Rearm)
            }
        };

        Ok(DispatchReport {
            name,
            instance_id: registration.instance_id,
            run,
            action,
        })
    }
}
