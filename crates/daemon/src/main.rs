//! NetOps Automation Daemon - Main Entry Point
//! Scheduler + Execution Engine + JSON-RPC Server

mod config;
mod logging;
mod telemetry;

use anyhow::{Context, Result};
use config::DaemonConfig;
use std::sync::Arc;
use tracing::{error, info, warn};

// Import workspace crates
use netops_api_rpc::{RpcServer, RpcServerConfig};
use netops_core::application::constants::RUN_SHUTDOWN_GRACE;
use netops_core::application::{
    shutdown_channel, AutomationService, EngineConfig, ExecutionEngine, JobRunner,
    RecoveryService, Scheduler, TaskRegistry,
};
use netops_core::port::id_provider::UuidProvider;
use netops_core::port::time_provider::SystemTimeProvider;
use netops_core::port::{IdProvider, TimeProvider};
use netops_infra_driver::{NapalmConfig, NapalmDriverFactory};
use netops_infra_sqlite::{create_pool, run_migrations, SqliteDeviceInventory, SqliteJobRepository};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::from_env()?;

    // 2. Initialize logging
    let _log_guard = logging::init(&config)?;

    info!("NetOps automation daemon v{} starting...", VERSION);

    // 3. Initialize database
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create database directory {}", parent.display()))?;
    }
    info!(db_path = %config.db_path.display(), "Initializing database...");

    let pool = create_pool(&config.database_url())
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let id_provider: Arc<dyn IdProvider> = Arc::new(UuidProvider);
    let repo = Arc::new(SqliteJobRepository::new(pool.clone()));
    let inventory = Arc::new(SqliteDeviceInventory::new(pool.clone()));
    let drivers = Arc::new(NapalmDriverFactory::new(NapalmConfig::new(
        config.napalm_bin.clone(),
        config.driver_timeout,
    )));

    let engine = Arc::new(ExecutionEngine::new(
        repo.clone(),
        inventory.clone(),
        drivers,
        TaskRegistry::standard(),
        time_provider.clone(),
        EngineConfig {
            max_workers: config.max_workers,
            backup_dir: config.backup_dir.clone(),
            strict_targets: config.strict_targets,
        },
    ));
    let runner = Arc::new(JobRunner::new(
        engine,
        repo.clone(),
        id_provider.clone(),
        time_provider.clone(),
    ));

    let (shutdown_tx, shutdown_token) = shutdown_channel();
    let scheduler = Arc::new(Scheduler::new(
        runner.clone(),
        time_provider.clone(),
        shutdown_token,
    ));
    let service = Arc::new(AutomationService::new(
        repo.clone(),
        repo.clone(),
        inventory,
        scheduler.clone(),
        runner.clone(),
        id_provider,
        time_provider.clone(),
    ));

    // 5. Run crash recovery (before any trigger can fire)
    info!("Running crash recovery...");
    let recovery_service = RecoveryService::new(repo.clone(), time_provider);
    match recovery_service.recover_orphaned_runs().await {
        Ok(count) => info!(recovered_runs = count, "Crash recovery completed"),
        Err(e) => error!(error = %e, "Crash recovery failed"),
    }

    // 6. Re-arm persisted schedules
    match service.restore_schedules().await {
        Ok(count) => info!(armed = count, "Schedules restored"),
        Err(e) => error!(error = %e, "Schedule restore failed"),
    }

    // 7. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        host: config.rpc_host.clone(),
        port: config.rpc_port,
    };
    let (rpc_addr, rpc_handle) = RpcServer::new(rpc_config, service)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(addr = %rpc_addr, "System ready");
    info!("Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    shutdown_signal().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 9. Graceful shutdown: stop triggers, stop accepting calls, drain runs
    shutdown_tx.shutdown();
    scheduler.clear();
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }
    rpc_handle.stopped().await;

    if !runner.wait_idle(RUN_SHUTDOWN_GRACE).await {
        warn!(
            in_flight = runner.in_flight(),
            "Runs still in progress at exit; they will be marked failed on next start"
        );
    }

    pool.close().await;
    info!("Shutdown complete.");

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}
