//! Named mutual-exclusion records shared by every replica.
//!
//! A lock is one row keyed by name. Taking it is a compare-and-swap on the
//! row's `version`: the writer reads the row, then updates it only if the
//! version is still the one it read. Exactly one concurrent writer can win
//! that update. A held lock whose `expires_at` has passed is logically free;
//! the periodic sweep ([`LockRegistry::cleanup_expired`]) makes it physically
//! free.
//!
//! Storage sits behind [`LockStore`] so the registry runs unchanged against
//! Postgres ([`crate::db::PgLockStore`]) or in memory ([`MemoryLockStore`]).

mod memory;
mod registry;

pub use memory::MemoryLockStore;
pub use registry::{default_holder_id, LockOutcome, LockRegistry};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;

/// Outcome note stamped by the expiry sweep.
pub const EXPIRED_RESULT: &str = "expired (auto-cleanup)";

/// Errors from the lock storage layer.
///
/// The registry never surfaces these from acquisition; they are downgraded
/// to a failed acquisition.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock storage error: {0}")]
    Storage(#[from] DbError),
}

/// One row of the lock table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub lock_name: String,
    pub is_locked: bool,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_result: Option<String>,
}

impl LockRecord {
    /// A fresh, unlocked record.
    pub fn unlocked(name: &str) -> Self {
        Self {
            lock_name: name.to_string(),
            is_locked: false,
            locked_by: None,
            locked_at: None,
            expires_at: None,
            version: 0,
            last_run_at: None,
            last_run_result: None,
        }
    }

    /// Whether the lock is held and unexpired at `now`.
    ///
    /// A locked row with no expiry is treated as expired.
    pub fn is_held_at(&self, now: DateTime<Utc>) -> bool {
        self.is_locked && self.expires_at.is_some_and(|expires| expires > now)
    }
}

/// Operator-facing view of a lock.
#[derive(Debug, Clone, Serialize)]
pub struct LockStatus {
    pub name: String,
    /// Locked and not yet expired.
    pub held: bool,
    pub is_locked: bool,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_result: Option<String>,
}

impl LockStatus {
    pub fn from_record(record: LockRecord, now: DateTime<Utc>) -> Self {
        Self {
            held: record.is_held_at(now),
            name: record.lock_name,
            is_locked: record.is_locked,
            locked_by: record.locked_by,
            locked_at: record.locked_at,
            expires_at: record.expires_at,
            version: record.version,
            last_run_at: record.last_run_at,
            last_run_result: record.last_run_result,
        }
    }
}

/// Persistence seam for lock records.
///
/// Every mutating method is a single conditional write; none of them read
/// then write in two steps.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Creates an unlocked record for `name` if none exists.
    async fn ensure(&self, name: &str) -> Result<(), LockError>;

    async fn get(&self, name: &str) -> Result<Option<LockRecord>, LockError>;

    /// Takes the lock if its version is still `expected_version`, bumping
    /// the version. Returns whether exactly one row changed.
    async fn compare_and_acquire(
        &self,
        name: &str,
        expected_version: i64,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, LockError>;

    /// Clears the lock if `holder` still owns it and stamps the outcome.
    async fn release_owned(
        &self,
        name: &str,
        holder: &str,
        now: DateTime<Utc>,
        result: &str,
    ) -> Result<bool, LockError>;

    /// Moves `expires_at` forward if `holder` still owns the lock.
    async fn extend_owned(
        &self,
        name: &str,
        holder: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, LockError>;

    /// Unlocks every record whose expiry is before `now`. Returns the count.
    async fn reset_expired(&self, now: DateTime<Utc>, result: &str) -> Result<u64, LockError>;

    async fn list(&self) -> Result<Vec<LockRecord>, LockError>;
}
