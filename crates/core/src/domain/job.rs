// Job Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Payload key carrying the name of the job that produced a request.
pub const WORK_NAME_KEY: &str = "work_name";

/// Logical job slot. Exactly two exist and they are never generated at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobName {
    /// Recurring channel sync
    Periodic,
    /// Run-now channel sync (startup / install)
    OneShot,
}

impl JobName {
    pub const ALL: [JobName; 2] = [JobName::Periodic, JobName::OneShot];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::Periodic => "update_channels",
            JobName::OneShot => "update_channels_once",
        }
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self, JobName::Periodic)
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        JobName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| DomainError::UnknownJobName(s.to_string()))
    }
}

/// What happens when a request targets a slot that already holds an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictPolicy {
    /// Existing instance wins, the new request is dropped
    Keep,
    /// Existing instance is removed and the new request takes the slot
    Replace,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Keep => write!(f, "KEEP"),
            ConflictPolicy::Replace => write!(f, "REPLACE"),
        }
    }
}

/// Small string tag map attached to a request (e.g. its origin)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload(BTreeMap<String, String>);

impl JobPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload tagged as produced by `name`
    pub fn origin(name: JobName) -> Self {
        Self::new().with_tag(WORK_NAME_KEY, name.as_str())
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the request was produced by the one-shot job
    pub fn is_one_shot_origin(&self) -> bool {
        self.get(WORK_NAME_KEY) == Some(JobName::OneShot.as_str())
    }
}

/// Recurrence of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Periodic { interval: Duration },
    OneShot,
}

impl JobKind {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            JobKind::Periodic { interval } => Some(*interval),
            JobKind::OneShot => None,
        }
    }
}

/// A request to occupy a job slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: JobName,
    pub kind: JobKind,
    pub payload: JobPayload,
}

impl JobRequest {
    /// Build a request, rejecting a kind that does not match the slot
    pub fn new(name: JobName, kind: JobKind, payload: JobPayload) -> Result<Self> {
        match (name, &kind) {
            (JobName::Periodic, JobKind::Periodic { interval }) if interval.is_zero() => Err(
                DomainError::InvalidInterval("periodic interval must be non-zero".to_string()),
            ),
            (JobName::Periodic, JobKind::Periodic { .. }) | (JobName::OneShot, JobKind::OneShot) => {
                Ok(Self {
                    name,
                    kind,
                    payload,
                })
            }
            _ => Err(DomainError::ValidationError(format!(
                "job {} cannot be scheduled as {:?}",
                name, kind
            ))),
        }
    }

    pub fn periodic(interval: Duration) -> Result<Self> {
        Self::new(
            JobName::Periodic,
            JobKind::Periodic { interval },
            JobPayload::new(),
        )
    }

    pub fn one_shot(payload: JobPayload) -> Result<Self> {
        Self::new(JobName::OneShot, JobKind::OneShot, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_name_round_trips_through_str() {
        for name in JobName::ALL {
            assert_eq!(name.as_str().parse::<JobName>().unwrap(), name);
        }
        assert!(matches!(
            "update_everything".parse::<JobName>(),
            Err(DomainError::UnknownJobName(_))
        ));
    }

    #[test]
    fn test_origin_tag_identifies_one_shot() {
        assert!(JobPayload::origin(JobName::OneShot).is_one_shot_origin());
        assert!(!JobPayload::origin(JobName::Periodic).is_one_shot_origin());
        assert!(!JobPayload::new().is_one_shot_origin());
        assert!(!JobPayload::new()
            .with_tag(WORK_NAME_KEY, "Update channels once")
            .is_one_shot_origin());
    }

    #[test]
    fn test_request_kind_must_match_slot() {
        assert!(JobRequest::new(JobName::OneShot, JobKind::OneShot, JobPayload::new()).is_ok());
        assert!(JobRequest::new(
            JobName::Periodic,
            JobKind::OneShot,
            JobPayload::new()
        )
        .is_err());
        assert!(JobRequest::new(
            JobName::OneShot,
            JobKind::Periodic {
                interval: Duration::from_secs(60)
            },
            JobPayload::new()
        )
        .is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(matches!(
            JobRequest::periodic(Duration::ZERO),
            Err(DomainError::InvalidInterval(_))
        ));
    }
}
