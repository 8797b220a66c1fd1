//! Postgres storage for the scheduler.
//!
//! This module provides:
//! - Connection pool management and runtime migrations
//! - [`PgLockStore`], the durable table behind the lock registry
//! - [`PgPollRepository`], the poll records the rotation engine drives
//!
//! Queries are plain SQLx runtime queries against Postgres.

mod error;
mod locks;
mod polls;

pub use error::DbError;
pub use locks::PgLockStore;
pub use polls::PgPollRepository;

use std::path::PathBuf;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/tempo";

/// Pool settings. Only the URL and pool bounds come from the environment.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl DbConfig {
    /// `DATABASE_URL`, `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS`.
    /// Unparsable pool bounds fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let bound = |name: &str, fallback: u32| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(fallback)
        };

        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            max_connections: bound("DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: bound("DB_MIN_CONNECTIONS", defaults.min_connections),
            ..defaults
        }
    }
}

/// Places the migrations directory may be, depending on the working
/// directory the binary or test was started from.
fn migration_dirs() -> [PathBuf; 3] {
    [
        PathBuf::from("./migrations"),
        PathBuf::from("services/scheduler/migrations"),
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    ]
}

/// Shared pool plus handles to the scheduler tables.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.database_url)
            .await
            .map_err(DbError::Connect)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `SELECT 1` round trip, used by `/readyz`.
    pub async fn health_check(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }

    /// Applies pending migrations from the first migrations directory found.
    ///
    /// Replicas may race here on first boot; SQLx serializes migration runs
    /// with an advisory lock.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        let dirs = migration_dirs();
        let mut last_error = None;

        for dir in &dirs {
            match sqlx::migrate::Migrator::new(dir.as_path()).await {
                Ok(migrator) => {
                    info!(migrations_dir = %dir.display(), "Running database migrations");
                    migrator.run(&self.pool).await.map_err(DbError::Migration)?;
                    info!("Database migrations complete");
                    return Ok(());
                }
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        Err(DbError::MigrationDirNotFound {
            tried: dirs
                .iter()
                .map(|dir| dir.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            last_error: last_error.unwrap_or_else(|| "unknown error".to_string()),
        })
    }

    /// Lock table handle.
    pub fn lock_store(&self) -> PgLockStore {
        PgLockStore::new(self.pool.clone())
    }

    /// Poll table handle.
    pub fn poll_repository(&self) -> PgPollRepository {
        PgPollRepository::new(self.pool.clone())
    }
}
