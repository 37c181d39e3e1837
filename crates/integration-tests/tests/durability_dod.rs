//! Durability DoD: registrations outlive the process
//!
//! - Registrations survive closing and reopening the database file
//! - KEEP still deduplicates against what an earlier process registered
//! - A run orphaned by a crash is requeued on the next start
//! - A restart inside the recovery window does not wedge the slots: the
//!   dispatcher's periodic sweep requeues them once the window passes
//! - Storage failures surface as scheduling errors

use chansync_core::application::dispatcher::constants::PERIODIC_INTERVAL;
use chansync_core::application::{
    Dispatcher, DispatcherConfig, ExecutionGate, RecoveryService, RegistryWorkManager,
    ScheduleOutcome, Scheduler,
};
use chansync_core::domain::{FinishAction, JobName, RegisterOutcome, RegistrationState};
use chansync_core::port::foreground::mocks::StaticForeground;
use chansync_core::port::id_provider::UuidProvider;
use chansync_core::port::sync_task::mocks::ScriptedSyncTask;
use chansync_core::port::time_provider::mocks::ManualClock;
use chansync_core::port::time_provider::SystemTimeProvider;
use chansync_core::port::{JobRegistry, TimeProvider};
use chansync_infra_sqlite::{create_pool, probe_capability, run_migrations, SqliteJobRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MINUTE_MS: i64 = 60 * 1000;

fn temp_db_path() -> PathBuf {
    std::env::temp_dir().join(format!("chansync-durable-{}.db", uuid::Uuid::new_v4()))
}

fn remove_db(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}

/// Simulates one daemon start: open, migrate, build the registry
async fn open(path: &Path) -> (sqlx::SqlitePool, Arc<SqliteJobRegistry>) {
    let pool = create_pool(path.to_str().unwrap()).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let registry = Arc::new(SqliteJobRegistry::new(pool.clone()));
    (pool, registry)
}

fn scheduler(registry: Arc<SqliteJobRegistry>) -> Scheduler {
    Scheduler::new(Arc::new(RegistryWorkManager::new(
        registry,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
    )))
}

fn scheduler_at(registry: Arc<SqliteJobRegistry>, clock: Arc<ManualClock>) -> Scheduler {
    Scheduler::new(Arc::new(RegistryWorkManager::new(
        registry,
        Arc::new(UuidProvider),
        clock,
    )))
}

#[tokio::test]
async fn test_registrations_survive_reopen() {
    let path = temp_db_path();

    let (pool, registry) = open(&path).await;
    assert!(probe_capability(&pool).await.unwrap());
    scheduler(registry.clone()).schedule(true, true).await.unwrap();
    let before = registry.list().await.unwrap();
    pool.close().await;

    let (pool, registry) = open(&path).await;
    let after = registry.list().await.unwrap();
    assert_eq!(before, after);
    assert_eq!(after.len(), 2);

    // Second "process" schedules again: nothing new is stored
    scheduler(registry.clone()).schedule(true, true).await.unwrap();
    assert_eq!(registry.list().await.unwrap(), before);

    pool.close().await;
    remove_db(&path);
    println!("✅ Registrations persisted across reopen");
}

#[tokio::test]
async fn test_orphaned_run_requeued_after_restart() {
    let path = temp_db_path();

    // First process claims the one-shot and dies before finishing
    let (pool, registry) = open(&path).await;
    scheduler(registry.clone()).schedule(true, true).await.unwrap();
    let now = SystemTimeProvider.now_millis();
    let claimed = registry.claim_due(now).await.unwrap();
    assert!(claimed.iter().any(|r| r.name() == JobName::OneShot));
    pool.close().await;

    // Second process starts 31 minutes later
    let (pool, registry) = open(&path).await;
    let stuck = registry.find(JobName::OneShot).await.unwrap().unwrap();
    assert_eq!(stuck.state, RegistrationState::Running);

    let clock = Arc::new(ManualClock::new(now + 31 * 60 * 1000));
    let recovery = RecoveryService::new(registry.clone(), clock, None);
    assert_eq!(recovery.recover_orphaned_runs().await.unwrap(), 1);

    let requeued = registry.find(JobName::OneShot).await.unwrap().unwrap();
    assert_eq!(requeued.state, RegistrationState::Enqueued);
    assert_eq!(requeued.instance_id, stuck.instance_id);
    assert_eq!(requeued.started_at, None);

    pool.close().await;
    remove_db(&path);
    println!("✅ Orphaned run requeued on restart");
}

#[tokio::test]
async fn test_restart_inside_recovery_window_does_not_wedge_slots() {
    let path = temp_db_path();
    let start = 1_700_000_000_000;

    // First process claims both jobs at the first periodic firing and dies
    let (pool, registry) = open(&path).await;
    let clock = Arc::new(ManualClock::new(start));
    scheduler_at(registry.clone(), clock.clone())
        .schedule(true, true)
        .await
        .unwrap();
    clock.advance(PERIODIC_INTERVAL);
    let claimed = registry.claim_due(clock.now_millis()).await.unwrap();
    assert_eq!(claimed.len(), 2);
    pool.close().await;

    // Second process starts one minute later, well inside the window
    let (pool, registry) = open(&path).await;
    let clock = Arc::new(ManualClock::new(start + 16 * MINUTE_MS));
    let recovery = Arc::new(RecoveryService::new(
        registry.clone(),
        clock.clone(),
        None,
    ));
    assert_eq!(recovery.recover_orphaned_runs().await.unwrap(), 0);

    let outcome = scheduler_at(registry.clone(), clock.clone())
        .schedule(true, true)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ScheduleOutcome::Registered {
            periodic: RegisterOutcome::Duplicate,
            one_shot: RegisterOutcome::Duplicate,
        }
    );

    let task = Arc::new(ScriptedSyncTask::succeeding());
    let gate = Arc::new(ExecutionGate::new(
        Arc::new(StaticForeground::new(false)),
        task.clone(),
    ));
    let dispatcher = Dispatcher::new(
        registry.clone(),
        gate,
        clock.clone(),
        DispatcherConfig::default(),
    )
    .with_recovery(recovery);
    assert!(dispatcher.dispatch_due().await.unwrap().is_empty());

    // Once the window has passed the sweep frees both slots
    clock.set(start + 46 * MINUTE_MS);
    assert_eq!(dispatcher.recover_stale().await.unwrap(), 2);

    let mut reports = dispatcher.dispatch_due().await.unwrap();
    reports.sort_by_key(|r| r.name.as_str());
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].name, JobName::Periodic);
    assert_eq!(reports[0].action, Some(FinishAction::Rearm));
    assert_eq!(reports[1].name, JobName::OneShot);
    assert_eq!(reports[1].action, Some(FinishAction::Clear));
    assert_eq!(task.runs(), 2);

    // The periodic schedule is alive again
    clock.advance(PERIODIC_INTERVAL);
    let reports = dispatcher.dispatch_due().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].name, JobName::Periodic);
    assert_eq!(task.runs(), 3);

    pool.close().await;
    remove_db(&path);
    println!("✅ Restart inside the recovery window recovered by the sweep");
}

#[tokio::test]
async fn test_storage_failure_surfaces_as_error() {
    let path = temp_db_path();
    let (pool, registry) = open(&path).await;
    let scheduler = scheduler(registry.clone());
    pool.close().await;

    assert!(scheduler.schedule(true, true).await.is_err());
    assert!(scheduler.cancel(true, true).await.is_err());

    remove_db(&path);
    println!("✅ Storage failures surface as scheduling errors");
}
