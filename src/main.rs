//! OpsHub Agent — recurring-job orchestration daemon.
//!
//! Main entry point that wires the cron core together and runs the firing
//! engine until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use opshub_core::config::AppConfig;
use opshub_core::error::AppError;
use opshub_core::traits::account::AccountResolver;
use opshub_cron::alert::AlertBridge;
use opshub_cron::engine::{Clock, CronEngine, SystemClock};
use opshub_cron::registry::CronjobService;
use opshub_cron::retention::RetentionManager;
use opshub_cron::runner::{ActionInvoker, JobRunner};
use opshub_database::migration;
use opshub_database::repositories::{CronjobRepository, RecordRepository};
use opshub_database::DatabasePool;

mod local;

#[tokio::main]
async fn main() {
    let env = std::env::var("OPSHUB_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Agent error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt().json().with_env_filter(filter).with_target(true).init();
        }
        _ => {
            fmt().pretty().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Main agent run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting OpsHub agent v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = std::path::PathBuf::from(&config.scheduler.data_dir);

    // ── Step 1: Create data directories ──────────────────────────
    for dir in ["logs/cronjob", "scripts", "downloads", "backups"] {
        let path = data_dir.join(dir);
        tokio::fs::create_dir_all(&path).await.map_err(|e| {
            AppError::internal(format!("Failed to create dir '{}': {}", path.display(), e))
        })?;
    }

    // ── Step 2: Database connection + migrations ─────────────────
    tracing::info!("Opening database...");
    let db = DatabasePool::connect(&config.database).await?;
    migration::run_migrations(db.pool()).await?;
    let pool = db.into_pool();

    // ── Step 3: Repositories ─────────────────────────────────────
    let jobs = Arc::new(CronjobRepository::new(pool.clone()));
    let records = Arc::new(RecordRepository::new(pool));

    // ── Step 4: Engine ───────────────────────────────────────────
    let engine = Arc::new(
        CronEngine::new(Arc::new(SystemClock) as Arc<dyn Clock>).with_tick_interval(
            Duration::from_secs(config.scheduler.tick_interval_seconds.max(1)),
        ),
    );

    // ── Step 5: Collaborators ────────────────────────────────────
    // Stand-alone defaults; a full platform deployment substitutes its
    // own account registry, resolvers, alert system, and drivers.
    let accounts = Arc::new(local::LocalAccounts::new(data_dir.join("backups")).await?)
        as Arc<dyn AccountResolver>;
    let alerts = Arc::new(local::LogAlertBridge::default()) as Arc<dyn AlertBridge>;
    let invoker = Arc::new(local::ShellInvoker) as Arc<dyn ActionInvoker>;

    // ── Step 6: Cron core ────────────────────────────────────────
    let retention = Arc::new(RetentionManager::new(
        Arc::clone(&records),
        Arc::clone(&accounts),
    ));
    let runner = Arc::new(JobRunner::new(
        Arc::clone(&jobs),
        Arc::clone(&records),
        Arc::clone(&retention),
        Arc::clone(&alerts),
        Arc::clone(&invoker),
        data_dir.clone(),
    ));
    let service = CronjobService::new(
        Arc::clone(&jobs),
        Arc::clone(&records),
        Arc::clone(&engine),
        runner,
        retention,
        Arc::clone(&accounts),
        Arc::new(local::OfflineSources::new("app")),
        Arc::new(local::OfflineSources::new("website")),
        Arc::new(local::OfflineSources::new("database")),
        Arc::clone(&alerts),
        data_dir,
    );

    // ── Step 7: Resume enabled jobs ──────────────────────────────
    service.resume().await?;

    // ── Step 8: Run until shutdown ───────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let engine_handle = if config.scheduler.enabled {
        let engine = Arc::clone(&engine);
        Some(tokio::spawn(async move {
            engine.run(shutdown_rx).await;
        }))
    } else {
        tracing::info!("Scheduler disabled");
        None
    };

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping...");
    let _ = shutdown_tx.send(true);

    if let Some(handle) = engine_handle {
        let _ = tokio::time::timeout(Duration::from_secs(10), handle).await;
    }

    tracing::info!("OpsHub agent shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
