// SQLite JobRegistry Implementation
//
// One row per job name. Every state change is a single conditional
// statement, so two processes sharing the file cannot both win a slot or
// both claim the same run.

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use chansync_core::domain::{
    ConflictPolicy, DomainError, FinishAction, InstanceId, JobKind, JobName, JobPayload,
    JobRequest, RegisterOutcome, Registration, RunOutcome,
};
use chansync_core::port::JobRegistry;
use chansync_core::Result;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::debug;

const KIND_PERIODIC: &str = "PERIODIC";
const KIND_ONE_SHOT: &str = "ONE_SHOT";

const INSERT_REGISTRATION: &str = r#"
    INSERT INTO registrations (
        name, instance_id, kind, interval_ms, payload, state,
        registered_at, next_run_at, started_at,
        run_count, consecutive_failures, last_outcome, last_error
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

pub struct SqliteJobRegistry {
    pool: SqlitePool,
}

impl SqliteJobRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRegistry for SqliteJobRegistry {
    async fn register_if_absent(
        &self,
        registration: Registration,
        policy: ConflictPolicy,
    ) -> Result<RegisterOutcome> {
        let row = RegistrationRow::from_registration(&registration)?;

        match policy {
            ConflictPolicy::Keep => {
                let sql = format!("{} ON CONFLICT(name) DO NOTHING", INSERT_REGISTRATION);
                let result = row
                    .bind_insert(sqlx::query(&sql))
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                if result.rows_affected() == 1 {
                    Ok(RegisterOutcome::Admitted)
                } else {
                    debug!(job = %row.name, "Slot occupied, keeping existing registration");
                    Ok(RegisterOutcome::Duplicate)
                }
            }
            ConflictPolicy::Replace => {
                // DELETE first so the transaction takes the write lock up front
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                let removed = sqlx::query("DELETE FROM registrations WHERE name = ?")
                    .bind(&row.name)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                row.bind_insert(sqlx::query(INSERT_REGISTRATION))
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;

                tx.commit().await.map_err(map_sqlx_error)?;

                Ok(if removed > 0 {
                    RegisterOutcome::Replaced
                } else {
                    RegisterOutcome::Admitted
                })
            }
        }
    }

    async fn cancel(&self, name: JobName) -> Result<bool> {
        let result = sqlx::query("DELETE FROM registrations WHERE name = ?")
            .bind(name.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, name: JobName) -> Result<Option<Registration>> {
        let row: Option<RegistrationRow> =
            sqlx::query_as("SELECT * FROM registrations WHERE name = ?")
                .bind(name.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        row.map(RegistrationRow::into_registration).transpose()
    }

    async fn list(&self) -> Result<Vec<Registration>> {
        let rows: Vec<RegistrationRow> =
            sqlx::query_as("SELECT * FROM registrations ORDER BY name")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(RegistrationRow::into_registration)
            .collect()
    }

    async fn claim_due(&self, now_millis: i64) -> Result<Vec<Registration>> {
        let rows: Vec<RegistrationRow> = sqlx::query_as(
            r#"
            UPDATE registrations
            SET state = 'RUNNING', started_at = ?
            WHERE state = 'ENQUEUED' AND next_run_at <= ?
            RETURNING *
            "#,
        )
        .bind(now_millis)
        .bind(now_millis)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(RegistrationRow::into_registration)
            .collect()
    }

    async fn finish(
        &self,
        instance_id: &InstanceId,
        outcome: &RunOutcome,
        now_millis: i64,
    ) -> Result<Option<(FinishAction, Registration)>> {
        let row: Option<RegistrationRow> = sqlx::query_as(
            "SELECT * FROM registrations WHERE instance_id = ? AND state = 'RUNNING'",
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut registration = row.into_registration()?;
        let action = registration.finish(outcome, now_millis)?;

        // Guarded on instance_id + RUNNING: a cancel or replace that landed
        // while the task ran wins and this write becomes a no-op.
        let affected = match action {
            FinishAction::Clear => sqlx::query(
                "DELETE FROM registrations WHERE instance_id = ? AND state = 'RUNNING'",
            )
            .bind(instance_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected(),
            FinishAction::Rearm => sqlx::query(
                r#"
                UPDATE registrations
                SET state = ?, started_at = NULL, next_run_at = ?,
                    run_count = ?, consecutive_failures = ?,
                    last_outcome = ?, last_error = ?
                WHERE instance_id = ? AND state = 'RUNNING'
                "#,
            )
            .bind(registration.state.to_string())
            .bind(registration.next_run_at)
            .bind(registration.run_count)
            .bind(registration.consecutive_failures)
            .bind(&registration.last_outcome)
            .bind(&registration.last_error)
            .bind(instance_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected(),
        };

        if affected == 0 {
            return Ok(None);
        }
        Ok(Some((action, registration)))
    }

    async fn requeue_stale(
        &self,
        started_before: i64,
        now_millis: i64,
    ) -> Result<Vec<Registration>> {
        let rows: Vec<RegistrationRow> = sqlx::query_as(
            r#"
            UPDATE registrations
            SET state = 'ENQUEUED', started_at = NULL, next_run_at = ?
            WHERE state = 'RUNNING' AND (started_at IS NULL OR started_at < ?)
            RETURNING *
            "#,
        )
        .bind(now_millis)
        .bind(started_before)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(RegistrationRow::into_registration)
            .collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RegistrationRow {
    name: String,
    instance_id: String,
    kind: String,
    interval_ms: Option<i64>,
    payload: String,
    state: String,
    registered_at: i64,
    next_run_at: i64,
    started_at: Option<i64>,
    run_count: i64,
    consecutive_failures: i64,
    last_outcome: Option<String>,
    last_error: Option<String>,
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

impl RegistrationRow {
    fn from_registration(registration: &Registration) -> Result<Self> {
        let (kind, interval_ms) = match registration.request.kind {
            JobKind::Periodic { interval } => (
                KIND_PERIODIC,
                Some(i64::try_from(interval.as_millis()).unwrap_or(i64::MAX)),
            ),
            JobKind::OneShot => (KIND_ONE_SHOT, None),
        };

        Ok(Self {
            name: registration.name().as_str().to_string(),
            instance_id: registration.instance_id.clone(),
            kind: kind.to_string(),
            interval_ms,
            payload: serde_json::to_string(&registration.request.payload)?,
            state: registration.state.to_string(),
            registered_at: registration.registered_at,
            next_run_at: registration.next_run_at,
            started_at: registration.started_at,
            run_count: registration.run_count,
            consecutive_failures: registration.consecutive_failures,
            last_outcome: registration.last_outcome.clone(),
            last_error: registration.last_error.clone(),
        })
    }

    fn bind_insert<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(&self.name)
            .bind(&self.instance_id)
            .bind(&self.kind)
            .bind(self.interval_ms)
            .bind(&self.payload)
            .bind(&self.state)
            .bind(self.registered_at)
            .bind(self.next_run_at)
            .bind(self.started_at)
            .bind(self.run_count)
            .bind(self.consecutive_failures)
            .bind(&self.last_outcome)
            .bind(&self.last_error)
    }

    fn into_registration(self) -> Result<Registration> {
        let name: JobName = self.name.parse()?;
        let kind = match self.kind.as_str() {
            KIND_PERIODIC => {
                let ms = self
                    .interval_ms
                    .and_then(|ms| u64::try_from(ms).ok())
                    .ok_or_else(|| {
                        DomainError::InvalidInterval(format!(
                            "{} stored without a valid interval",
                            name
                        ))
                    })?;
                JobKind::Periodic {
                    interval: Duration::from_millis(ms),
                }
            }
            KIND_ONE_SHOT => JobKind::OneShot,
            other => {
                return Err(
                    DomainError::ValidationError(format!("unknown job kind: {}", other)).into(),
                )
            }
        };
        let payload: JobPayload = serde_json::from_str(&self.payload)?;

        Ok(Registration {
            instance_id: self.instance_id,
            request: JobRequest::new(name, kind, payload)?,
            state: self.state.parse()?,
            registered_at: self.registered_at,
            next_run_at: self.next_run_at,
            started_at: self.started_at,
            run_count: self.run_count,
            consecutive_failures: self.consecutive_failures,
            last_outcome: self.last_outcome,
            last_error: self.last_error,
        })
    }
}
