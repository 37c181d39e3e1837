// Execution Gate - admission check run right before the sync task
//
// Skip when the host app is in the foreground, unless the run came from the
// one-shot job. Whatever the sync task does, the run counts as a success for
// the substrate: a failed sync must not push the recurring job into backoff.

use crate::domain::{JobName, JobPayload, RunOutcome};
use crate::port::{ForegroundOracle, SyncTask};
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Admit,
    Skip,
}

/// Outcome of one pass through the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub decision: GateDecision,
    pub outcome: RunOutcome,
}

pub struct ExecutionGate {
    foreground: Arc<dyn ForegroundOracle>,
    task: Arc<dyn SyncTask>,
}

impl ExecutionGate {
    pub fn new(foreground: Arc<dyn ForegroundOracle>, task: Arc<dyn SyncTask>) -> Self {
        Self { foreground, task }
    }

    /// Fresh decision for this invocation; nothing is remembered between runs
    pub async fn decide(&self, payload: &JobPayload) -> GateDecision {
        if payload.is_one_shot_origin() {
            return GateDecision::Admit;
        }

        if self.foreground.is_foreground().await {
            GateDecision::Skip
        } else {
            GateDecision::Admit
        }
    }

    /// Gate entry point invoked by the substrate when `name` fires.
    ///
    /// Never fails. Sync errors and panics are logged and folded into
    /// `RunOutcome::SyncFailed`.
    pub async fn run(&self, name: JobName, payload: &JobPayload) -> RunReport {
        debug!(job = %name, "Starting sync run");

        let decision = self.decide(payload).await;
        if decision == GateDecision::Skip {
            info!(job = %name, "Host app in foreground, sync skipped");
            return RunReport {
                decision,
                outcome: RunOutcome::Skipped,
            };
        }

        // Spawned so a panicking sync task cannot take the dispatcher down
        let task = Arc::clone(&self.task);
        let handle = tokio::spawn(async move { task.run().await });

        let outcome = match handle.await {
            Ok(Ok(())) => {
                info!(job = %name, "Channel sync completed");
                RunOutcome::Synced
            }
            Ok(Err(e)) => {
                warn!(job = %name, error = %e, "Channel sync failed");
                RunOutcome::SyncFailed(e.to_string())
            }
            Err(join_err) => {
                let reason = if join_err.is_panic() {
                    format!("sync task panicked: {}", panic_message(join_err.into_panic()))
                } else {
                    "sync task cancelled".to_string()
                };
                error!(job = %name, reason = %reason, "Channel sync aborted");
                RunOutcome::SyncFailed(reason)
            }
        };

        RunReport { decision, outcome }
    }
}

fn panic_message(panic: Box<dyn Any + Send + 'static>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::foreground::MockForegroundOracle;
    use crate::port::sync_task::{MockSyncTask, SyncTaskError};

    fn foreground(is_foreground: bool) -> MockForegroundOracle {
        let mut oracle = MockForegroundOracle::new();
        oracle.expect_is_foreground().return_const(is_foreground);
        oracle
    }

    fn sync_once(result: fn() -> Result<(), SyncTaskError>) -> MockSyncTask {
        let mut task = MockSyncTask::new();
        task.expect_run().times(1).returning(move || result());
        task
    }

    fn never_synced() -> MockSyncTask {
        let mut task = MockSyncTask::new();
        task.expect_run().never();
        task
    }

    #[tokio::test]
    async fn test_one_shot_admitted_in_foreground() {
        let gate = ExecutionGate::new(Arc::new(foreground(true)), Arc::new(sync_once(|| Ok(()))));

        let report = gate
            .run(JobName::OneShot, &JobPayload::origin(JobName::OneShot))
            .await;

        assert_eq!(report.decision, GateDecision::Admit);
        assert_eq!(report.outcome, RunOutcome::Synced);
    }

    #[tokio::test]
    async fn test_periodic_skipped_in_foreground() {
        let gate = ExecutionGate::new(Arc::new(foreground(true)), Arc::new(never_synced()));

        let report = gate.run(JobName::Periodic, &JobPayload::new()).await;

        assert_eq!(report.decision, GateDecision::Skip);
        assert_eq!(report.outcome, RunOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_periodic_admitted_in_background() {
        let gate = ExecutionGate::new(Arc::new(foreground(false)), Arc::new(sync_once(|| Ok(()))));

        let report = gate.run(JobName::Periodic, &JobPayload::new()).await;

        assert_eq!(report.decision, GateDecision::Admit);
        assert_eq!(report.outcome, RunOutcome::Synced);
    }

    #[tokio::test]
    async fn test_one_shot_does_not_consult_oracle() {
        let mut oracle = MockForegroundOracle::new();
        oracle.expect_is_foreground().never();
        let gate = ExecutionGate::new(Arc::new(oracle), Arc::new(never_synced()));

        let decision = gate.decide(&JobPayload::origin(JobName::OneShot)).await;

        assert_eq!(decision, GateDecision::Admit);
    }

    #[tokio::test]
    async fn test_sync_error_is_swallowed() {
        let gate = ExecutionGate::new(
            Arc::new(foreground(false)),
            Arc::new(sync_once(|| {
                Err(SyncTaskError::Failed("provider rejected batch".to_string()))
            })),
        );

        let report = gate.run(JobName::Periodic, &JobPayload::new()).await;

        assert_eq!(report.decision, GateDecision::Admit);
        match report.outcome {
            RunOutcome::SyncFailed(msg) => assert!(msg.contains("provider rejected batch")),
            other => panic!("expected SyncFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sync_panic_is_swallowed() {
        use crate::port::sync_task::mocks::ScriptedSyncTask;

        let task = Arc::new(ScriptedSyncTask::panicking("content provider vanished"));
        let gate = ExecutionGate::new(Arc::new(foreground(false)), task.clone());

        let report = gate.run(JobName::Periodic, &JobPayload::new()).await;

        assert_eq!(task.runs(), 1);
        match report.outcome {
            RunOutcome::SyncFailed(msg) => {
                assert!(msg.contains("panicked"));
                assert!(msg.contains("content provider vanished"));
            }
            other => panic!("expected SyncFailed, got {:?}", other),
        }
    }
}
