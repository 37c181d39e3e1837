// Registration Domain Model
//
// A registration is the single live instance occupying a job slot.

use crate::domain::error::{DomainError, Result};
use crate::domain::job::{JobKind, JobName, JobRequest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Registration instance ID (UUID v4)
pub type InstanceId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationState {
    /// Waiting for its next firing
    Enqueued,
    /// Claimed by a dispatcher, execution in progress
    Running,
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationState::Enqueued => write!(f, "ENQUEUED"),
            RegistrationState::Running => write!(f, "RUNNING"),
        }
    }
}

impl std::str::FromStr for RegistrationState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ENQUEUED" => Ok(RegistrationState::Enqueued),
            "RUNNING" => Ok(RegistrationState::Running),
            other => Err(DomainError::UnknownState(other.to_string())),
        }
    }
}

/// Result of `register_if_absent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Slot was empty, request registered
    Admitted,
    /// Slot was occupied and the policy kept the existing instance
    Duplicate,
    /// Slot was occupied and the policy replaced the existing instance
    Replaced,
}

impl RegisterOutcome {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, RegisterOutcome::Duplicate)
    }
}

impl fmt::Display for RegisterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterOutcome::Admitted => write!(f, "admitted"),
            RegisterOutcome::Duplicate => write!(f, "rejected (duplicate)"),
            RegisterOutcome::Replaced => write!(f, "admitted (replaced)"),
        }
    }
}

/// What a single firing actually did. Recorded for observability only; the
/// work result handed back to the substrate is always success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Gate skipped the sync (host in foreground)
    Skipped,
    /// Sync task ran to completion
    Synced,
    /// Sync task failed; error swallowed at the gate
    SyncFailed(String),
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Skipped => "SKIPPED",
            RunOutcome::Synced => "SYNCED",
            RunOutcome::SyncFailed(_) => "SYNC_FAILED",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RunOutcome::SyncFailed(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::SyncFailed(_))
    }
}

/// What the registry must do with a registration once its run finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishAction {
    /// One-shot done, slot freed
    Clear,
    /// Periodic re-armed for the next firing
    Rearm,
}

/// Registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub instance_id: InstanceId,
    pub request: JobRequest,
    pub state: RegistrationState,

    pub registered_at: i64, // epoch ms
    pub next_run_at: i64,
    pub started_at: Option<i64>,

    pub run_count: i64,
    pub consecutive_failures: i64,
    pub last_outcome: Option<String>,
    pub last_error: Option<String>,
}

impl Registration {
    /// Create a registration for `request`, due immediately for one-shot
    /// requests and one interval after `now` for periodic ones.
    pub fn new(instance_id: impl Into<String>, request: JobRequest, now_millis: i64) -> Self {
        let next_run_at = match request.kind {
            JobKind::Periodic { interval } => now_millis.saturating_add(duration_millis(interval)),
            JobKind::OneShot => now_millis,
        };

        Self {
            instance_id: instance_id.into(),
            request,
            state: RegistrationState::Enqueued,
            registered_at: now_millis,
            next_run_at,
            started_at: None,
            run_count: 0,
            consecutive_failures: 0,
            last_outcome: None,
            last_error: None,
        }
    }

    pub fn name(&self) -> JobName {
        self.request.name
    }

    pub fn is_due(&self, now_millis: i64) -> bool {
        self.state == RegistrationState::Enqueued && self.next_run_at <= now_millis
    }

    /// Transition to Running with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.state != RegistrationState::Enqueued {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: RegistrationState::Running.to_string(),
            });
        }
        self.state = RegistrationState::Running;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Record the outcome of a run and decide whether the slot is freed.
    pub fn finish(&mut self, outcome: &RunOutcome, now_millis: i64) -> Result<FinishAction> {
        if self.state != RegistrationState::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: RegistrationState::Enqueued.to_string(),
            });
        }

        self.run_count += 1;
        self.last_outcome = Some(outcome.label().to_string());
        self.last_error = outcome.error().map(str::to_string);
        if outcome.is_failure() {
            self.consecutive_failures += 1;
        } else if *outcome == RunOutcome::Synced {
            self.consecutive_failures = 0;
        }

        match self.request.kind {
            JobKind::OneShot => Ok(FinishAction::Clear),
            JobKind::Periodic { interval } => {
                self.state = RegistrationState::Enqueued;
                self.started_at = None;
                self.next_run_at = now_millis.saturating_add(duration_millis(interval));
                Ok(FinishAction::Rearm)
            }
        }
    }

    /// Put an orphaned Running registration back in line, due at `now`
    pub fn requeue(&mut self, now_millis: i64) {
        self.state = RegistrationState::Enqueued;
        self.started_at = None;
        self.next_run_at = now_millis;
    }
}

pub(crate) fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
