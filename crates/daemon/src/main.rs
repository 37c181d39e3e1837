//! chansync - Main Entry Point
//! Registers the channel sync jobs and drives them until Ctrl+C

mod config;
mod logging;
mod telemetry;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use chansync_core::application::{
    shutdown_channel, Dispatcher, DispatcherConfig, ExecutionGate, RecoveryService,
    RegistryWorkManager, Scheduler,
};
use chansync_core::port::id_provider::UuidProvider;
use chansync_core::port::time_provider::SystemTimeProvider;
use chansync_core::port::ForegroundOracle;
use chansync_infra_sqlite::{create_pool, probe_capability, run_migrations, SqliteJobRegistry};
use chansync_infra_system::{ForegroundFlag, ProcessForegroundOracle, SubprocessSyncTask};
use config::DaemonConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration (needed before logging picks its format)
    let config = DaemonConfig::from_env().context("Invalid configuration")?;

    // 2. Initialize logging
    let _log_guard = logging::init(&config)?;
    info!("chansync v{} starting...", VERSION);

    // 3. Initialize database
    info!(db_path = %config.db_path, "Initializing registry database...");
    if let Some(parent) = Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }
    }
    let pool = create_pool(&config.db_path)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;
    let capability_available = probe_capability(&pool)
        .await
        .context("Capability probe failed")?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let registry = Arc::new(SqliteJobRegistry::new(pool.clone()));

    let work_manager = Arc::new(RegistryWorkManager::new(
        registry.clone(),
        Arc::new(UuidProvider),
        time_provider.clone(),
    ));
    let scheduler = Scheduler::new(work_manager);

    let foreground: Arc<dyn ForegroundOracle> = match &config.host_process {
        Some(name) => {
            info!(host_process = %name, "Foreground detection via host process activity");
            Arc::new(ProcessForegroundOracle::new(name.clone()))
        }
        None => {
            info!("No host process configured, treating host as background");
            Arc::new(ForegroundFlag::new(false))
        }
    };

    let mut sync_task = SubprocessSyncTask::new(&config.sync_program, config.sync_args.clone())
        .with_env_allowlist(config.sync_env_allowlist.clone());
    if let Some(limit) = config.sync_timeout {
        sync_task = sync_task.with_timeout(limit);
    }
    let gate = Arc::new(ExecutionGate::new(foreground, Arc::new(sync_task)));

    // 5. Run crash recovery
    info!("Running crash recovery...");
    let recovery_service = Arc::new(RecoveryService::new(
        registry.clone(),
        time_provider.clone(),
        None,
    ));
    match recovery_service.recover_orphaned_runs().await {
        Ok(count) => info!(recovered_runs = count, "Crash recovery completed"),
        Err(e) => error!(error = ?e, "Crash recovery failed"),
    }

    // 6. Register the sync jobs (no-op unless capable and enabled)
    let outcome = scheduler
        .schedule(capability_available, config.channels_enabled)
        .await
        .context("Scheduling channel sync failed")?;
    info!(
        outcome = ?outcome,
        channels_enabled = config.channels_enabled,
        capability_available,
        "Schedule requested"
    );

    // 7. Start Dispatcher
    info!("Starting dispatcher...");
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let dispatcher = Dispatcher::new(
        registry,
        gate,
        time_provider,
        DispatcherConfig {
            poll_interval: config.poll_interval,
            ..Default::default()
        },
    )
    .with_recovery(recovery_service);
    let dispatcher_handle = tokio::spawn(async move {
        if let Err(e) = dispatcher.run(shutdown_rx).await {
            error!(error = ?e, "Dispatcher failed");
        }
    });

    info!("System ready. Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 9. Graceful shutdown: an in-flight sync gets a bounded window to finish
    shutdown_tx.shutdown();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, dispatcher_handle)
        .await
        .is_err()
    {
        info!("Dispatcher still busy, abandoning in-flight run");
    }
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}
