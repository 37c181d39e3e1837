// Job Identity Registry Port (Interface)

use crate::domain::{
    ConflictPolicy, FinishAction, InstanceId, JobName, RegisterOutcome, Registration, RunOutcome,
};
use crate::error::Result;
use async_trait::async_trait;

/// Durable name -> instance map. At most one registration exists per
/// `JobName` at any time, across concurrent callers and process restarts.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Store `registration` unless its slot is taken; `policy` decides what
    /// happens when it is.
    async fn register_if_absent(
        &self,
        registration: Registration,
        policy: ConflictPolicy,
    ) -> Result<RegisterOutcome>;

    /// Remove whatever occupies `name` (enqueued or running).
    /// Returns false when the slot was already empty.
    async fn cancel(&self, name: JobName) -> Result<bool>;

    /// Current occupant of `name`
    async fn find(&self, name: JobName) -> Result<Option<Registration>>;

    /// All registrations, ordered by name
    async fn list(&self) -> Result<Vec<Registration>>;

    /// Atomically move every due Enqueued registration to Running and return
    /// them. Running registrations are never claimed twice.
    async fn claim_due(&self, now_millis: i64) -> Result<Vec<Registration>>;

    /// Record the end of a run for `instance_id`. Returns None when that
    /// instance no longer exists (cancelled or replaced mid-run).
    async fn finish(
        &self,
        instance_id: &InstanceId,
        outcome: &RunOutcome,
        now_millis: i64,
    ) -> Result<Option<(FinishAction, Registration)>>;

    /// Put registrations that have been Running since before `started_before`
    /// (left behind by a dead process) back in line, due at `now_millis`.
    async fn requeue_stale(
        &self,
        started_before: i64,
        now_millis: i64,
    ) -> Result<Vec<Registration>>;
}

// ============================================================================
// In-memory implementation for testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::RegistrationState;
    use crate::error::SchedulingError;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Registry kept in a map. Same semantics as the durable one, minus the
    /// durability.
    #[derive(Default)]
    pub struct InMemoryJobRegistry {
        slots: Mutex<BTreeMap<JobName, Registration>>,
    }

    impl InMemoryJobRegistry {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.slots.lock().map(|s| s.len()).unwrap_or(0)
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<JobName, Registration>>> {
            self.slots
                .lock()
                .map_err(|_| SchedulingError::Internal("registry lock poisoned".to_string()))
        }
    }

    #[async_trait]
    impl JobRegistry for InMemoryJobRegistry {
        async fn register_if_absent(
            &self,
            registration: Registration,
            policy: ConflictPolicy,
        ) -> Result<RegisterOutcome> {
            let mut slots = self.lock()?;
            let name = registration.name();
            let occupied = slots.contains_key(&name);

            match (occupied, policy) {
                (false, _) => {
                    slots.insert(name, registration);
                    Ok(RegisterOutcome::Admitted)
                }
                (true, ConflictPolicy::Keep) => Ok(RegisterOutcome::Duplicate),
                (true, ConflictPolicy::Replace) => {
                    slots.insert(name, registration);
                    Ok(RegisterOutcome::Replaced)
                }
            }
        }

        async fn cancel(&self, name: JobName) -> Result<bool> {
            Ok(self.lock()?.remove(&name).is_some())
        }

        async fn find(&self, name: JobName) -> Result<Option<Registration>> {
            Ok(self.lock()?.get(&name).cloned())
        }

        async fn list(&self) -> Result<Vec<Registration>> {
            Ok(self.lock()?.values().cloned().collect())
        }

        async fn claim_due(&self, now_millis: i64) -> Result<Vec<Registration>> {
            let mut slots = self.lock()?;
            let mut claimed = Vec::new();
            for registration in slots.values_mut() {
                if registration.is_due(now_millis) {
                    registration.start(now_millis)?;
                    claimed.push(registration.clone());
                }
            }
            Ok(claimed)
        }

        async fn finish(
            &self,
            instance_id: &InstanceId,
            outcome: &RunOutcome,
            now_millis: i64,
        ) -> Result<Option<(FinishAction, Registration)>> {
            let mut slots = self.lock()?;
            let Some(name) = slots
                .values()
                .find(|r| &r.instance_id == instance_id && r.state == RegistrationState::Running)
                .map(Registration::name)
            else {
                return Ok(None);
            };

            let Some(registration) = slots.get_mut(&name) else {
                return Ok(None);
            };
            let action = registration.finish(outcome, now_millis)?;
            let snapshot = registration.clone();
            if action == FinishAction::Clear {
                slots.remove(&name);
            }
            Ok(Some((action, snapshot)))
        }

        async fn requeue_stale(
            &self,
            started_before: i64,
            now_millis: i64,
        ) -> Result<Vec<Registration>> {
            let mut slots = self.lock()?;
            let mut requeued = Vec::new();
            for registration in slots.values_mut() {
                let stale = registration.started_at.map_or(true, |t| t < started_before);
                if registration.state == RegistrationState::Running && stale {
                    registration.requeue(now_millis);
                    requeued.push(registration.clone());
                }
            }
            Ok(requeued)
        }
    }

    /// In-memory registry whose writes can be made to fail, for exercising
    /// storage-error paths
    #[derive(Default)]
    pub struct FaultyJobRegistry {
        inner: InMemoryJobRegistry,
        fail_registration: AtomicBool,
        fail_finish: AtomicBool,
    }

    impl FaultyJobRegistry {
        pub fn new() -> Self {
            Self::default()
        }

        /// `register_if_absent` and `cancel` fail while set
        pub fn fail_registration(&self, fail: bool) {
            self.fail_registration.store(fail, Ordering::SeqCst);
        }

        /// `finish` fails while set
        pub fn fail_finish(&self, fail: bool) {
            self.fail_finish.store(fail, Ordering::SeqCst);
        }

        fn check(flag: &AtomicBool, op: &str) -> Result<()> {
            if flag.load(Ordering::SeqCst) {
                return Err(SchedulingError::Storage(format!(
                    "{} failed: disk I/O error",
                    op
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl JobRegistry for FaultyJobRegistry {
        async fn register_if_absent(
            &self,
            registration: Registration,
            policy: ConflictPolicy,
        ) -> Result<RegisterOutcome> {
            Self::check(&self.fail_registration, "register")?;
            self.inner.register_if_absent(registration, policy).await
        }

        async fn cancel(&self, name: JobName) -> Result<bool> {
            Self::check(&self.fail_registration, "cancel")?;
            self.inner.cancel(name).await
        }

        async fn find(&self, name: JobName) -> Result<Option<Registration>> {
            self.inner.find(name).await
        }

        async fn list(&self) -> Result<Vec<Registration>> {
            self.inner.list().await
        }

        async fn claim_due(&self, now_millis: i64) -> Result<Vec<Registration>> {
            self.inner.claim_due(now_millis).await
        }

        async fn finish(
            &self,
            instance_id: &InstanceId,
            outcome: &RunOutcome,
            now_millis: i64,
        ) -> Result<Option<(FinishAction, Registration)>> {
            Self::check(&self.fail_finish, "finish")?;
            self.inner.finish(instance_id, outcome, now_millis).await
        }

        async fn requeue_stale(
            &self,
            started_before: i64,
            now_millis: i64,
        ) -> Result<Vec<Registration>> {
            self.inner.requeue_stale(started_before, now_millis).await
        }
    }
}
