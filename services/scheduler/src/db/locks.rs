//! Postgres-backed lock table.
//!
//! Every write is a single `UPDATE` whose `WHERE` clause carries the guard
//! (version or ownership), so Postgres row locking decides the winner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, postgres::PgRow, Row};

use super::DbError;
use crate::locks::{LockError, LockRecord, LockStore};

/// Row wrapper so `LockRecord` stays free of SQLx.
struct LockRow(LockRecord);

impl<'r> sqlx::FromRow<'r, PgRow> for LockRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(LockRecord {
            lock_name: row.try_get("lock_name")?,
            is_locked: row.try_get("is_locked")?,
            locked_by: row.try_get("locked_by")?,
            locked_at: row.try_get("locked_at")?,
            expires_at: row.try_get("expires_at")?,
            version: row.try_get("version")?,
            last_run_at: row.try_get("last_run_at")?,
            last_run_result: row.try_get("last_run_result")?,
        }))
    }
}

const LOCK_COLUMNS: &str = "lock_name, is_locked, locked_by, locked_at, expires_at, version, \
                            last_run_at, last_run_result";

/// Lock store over the `scheduler_locks` table.
#[derive(Clone)]
pub struct PgLockStore {
    pool: PgPool,
}

impl PgLockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    async fn ensure(&self, name: &str) -> Result<(), LockError> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_locks (lock_name)
            VALUES ($1)
            ON CONFLICT (lock_name) DO NOTHING
            "#,
        )
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<LockRecord>, LockError> {
        let row = sqlx::query_as::<_, LockRow>(&format!(
            "SELECT {LOCK_COLUMNS} FROM scheduler_locks WHERE lock_name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(row.map(|LockRow(record)| record))
    }

    async fn compare_and_acquire(
        &self,
        name: &str,
        expected_version: i64,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, LockError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduler_locks
            SET is_locked = TRUE,
                locked_by = $3,
                locked_at = $4,
                expires_at = $5,
                version = version + 1,
                updated_at = now()
            WHERE lock_name = $1 AND version = $2
            "#,
        )
        .bind(name)
        .bind(expected_version)
        .bind(holder)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_owned(
        &self,
        name: &str,
        holder: &str,
        now: DateTime<Utc>,
        result: &str,
    ) -> Result<bool, LockError> {
        let done = sqlx::query(
            r#"
            UPDATE scheduler_locks
            SET is_locked = FALSE,
                locked_by = NULL,
                locked_at = NULL,
                expires_at = NULL,
                version = version + 1,
                last_run_at = $3,
                last_run_result = $4,
                updated_at = now()
            WHERE lock_name = $1 AND locked_by = $2 AND is_locked
            "#,
        )
        .bind(name)
        .bind(holder)
        .bind(now)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(done.rows_affected() == 1)
    }

    async fn extend_owned(
        &self,
        name: &str,
        holder: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, LockError> {
        let done = sqlx::query(
            r#"
            UPDATE scheduler_locks
            SET expires_at = $3,
                version = version + 1,
                updated_at = now()
            WHERE lock_name = $1 AND locked_by = $2 AND is_locked
            "#,
        )
        .bind(name)
        .bind(holder)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(done.rows_affected() == 1)
    }

    async fn reset_expired(&self, now: DateTime<Utc>, result: &str) -> Result<u64, LockError> {
        let done = sqlx::query(
            r#"
            UPDATE scheduler_locks
            SET is_locked = FALSE,
                locked_by = NULL,
                locked_at = NULL,
                expires_at = NULL,
                version = version + 1,
                last_run_result = $2,
                updated_at = now()
            WHERE is_locked AND expires_at < $1
            "#,
        )
        .bind(now)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(done.rows_affected())
    }

    async fn list(&self) -> Result<Vec<LockRecord>, LockError> {
        let rows = sqlx::query_as::<_, LockRow>(&format!(
            "SELECT {LOCK_COLUMNS} FROM scheduler_locks ORDER BY lock_name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(rows.into_iter().map(|LockRow(record)| record).collect())
    }
}
