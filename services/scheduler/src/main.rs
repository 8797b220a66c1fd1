//! tempo scheduler
//!
//! Opens and closes time-windowed polls on a fixed rotation. Every replica
//! runs the same job loops; a shared lock table decides which replica does
//! the work for each firing.

use std::sync::Arc;

use anyhow::Result;
use tempo_scheduler::{
    api,
    clock::{SharedClock, SystemClock},
    config::{self, StorageBackend},
    db::Database,
    jobs::{JobOrchestrator, JobRunner},
    locks::{LockRegistry, LockStore, MemoryLockStore},
    polls::{MemoryPollRepository, PollRepository},
    rotation::RotationEngine,
    state::AppState,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to TEMPO_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting tempo scheduler");
    info!(
        listen_addr = %config.listen_addr,
        instance_id = %config.instance_id,
        storage = ?config.storage,
        "Configuration loaded"
    );

    let (db, lock_store, polls): (Option<Database>, Arc<dyn LockStore>, Arc<dyn PollRepository>) =
        match config.storage {
            StorageBackend::Postgres => {
                let db = match Database::connect(&config.database).await {
                    Ok(db) => {
                        info!("Database connection established");
                        db
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to connect to database");
                        return Err(e.into());
                    }
                };

                // Run migrations in dev mode
                if config.dev_mode {
                    info!("Running database migrations (dev mode)");
                    if let Err(e) = db.run_migrations().await {
                        error!(error = %e, "Failed to run migrations");
                        return Err(e.into());
                    }
                }

                let lock_store: Arc<dyn LockStore> = Arc::new(db.lock_store());
                let polls: Arc<dyn PollRepository> = Arc::new(db.poll_repository());
                (Some(db), lock_store, polls)
            }
            StorageBackend::Memory => {
                warn!("Using in-memory storage; locks are not shared with other replicas");
                let lock_store: Arc<dyn LockStore> = Arc::new(MemoryLockStore::new());
                let polls: Arc<dyn PollRepository> = Arc::new(MemoryPollRepository::new());
                (None, lock_store, polls)
            }
        };

    let clock: SharedClock = Arc::new(SystemClock);
    let collaborators = config.collaborators.build(&config.rotation.categories)?;

    let locks = LockRegistry::new(lock_store, config.instance_id.clone(), clock.clone());
    let engine = RotationEngine::new(
        polls.clone(),
        collaborators.signals,
        collaborators.generator,
        clock.clone(),
        config.rotation.clone(),
    );
    let runner = Arc::new(JobRunner::new(
        locks,
        engine,
        collaborators.notifier,
        config.jobs.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Startup rotation, then one timer loop per job
    let orchestrator = JobOrchestrator::new(runner.clone(), config.schedule.clone(), clock);
    let job_handles = orchestrator.start(shutdown_rx.clone()).await;

    let app = api::create_router(AppState::new(runner, polls, db));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Ctrl+C, or the server stopping on its own
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    // A job body in flight finishes (and releases its lock) before its loop exits
    info!("Waiting for job loops to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);

    for job in job_handles {
        if let Err(e) = tokio::time::timeout(shutdown_timeout, job.handle).await {
            warn!(job = %job.job, error = %e, "Job loop did not shut down in time");
        }
    }

    info!("Scheduler shutdown complete");
    Ok(())
}
