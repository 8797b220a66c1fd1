//! In-memory lock store for tests and single-node development runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{LockError, LockRecord, LockStore};
use crate::db::DbError;

/// Lock table held in a mutex-guarded map.
///
/// Each method takes the mutex once, so every conditional write is atomic
/// in the same way a single-row `UPDATE` is.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    records: Mutex<BTreeMap<String, LockRecord>>,
    unavailable: AtomicBool,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), LockError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("memory lock store offline".to_string()).into());
        }
        Ok(())
    }

    fn records(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, LockRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn ensure(&self, name: &str) -> Result<(), LockError> {
        self.check_available()?;
        self.records()
            .entry(name.to_string())
            .or_insert_with(|| LockRecord::unlocked(name));
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<LockRecord>, LockError> {
        self.check_available()?;
        Ok(self.records().get(name).cloned())
    }

    async fn compare_and_acquire(
        &self,
        name: &str,
        expected_version: i64,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, LockError> {
        self.check_available()?;
        let mut records = self.records();
        let Some(record) = records.get_mut(name) else {
            return Ok(false);
        };
        if record.version != expected_version {
            return Ok(false);
        }
        record.is_locked = true;
        record.locked_by = Some(holder.to_string());
        record.locked_at = Some(now);
        record.expires_at = Some(expires_at);
        record.version += 1;
        Ok(true)
    }

    async fn release_owned(
        &self,
        name: &str,
        holder: &str,
        now: DateTime<Utc>,
        result: &str,
    ) -> Result<bool, LockError> {
        self.check_available()?;
        let mut records = self.records();
        let Some(record) = records.get_mut(name) else {
            return Ok(false);
        };
        if !record.is_locked || record.locked_by.as_deref() != Some(holder) {
            return Ok(false);
        }
        record.is_locked = false;
        record.locked_by = None;
        record.locked_at = None;
        record.expires_at = None;
        record.version += 1;
        record.last_run_at = Some(now);
        record.last_run_result = Some(result.to_string());
        Ok(true)
    }

    async fn extend_owned(
        &self,
        name: &str,
        holder: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, LockError> {
        self.check_available()?;
        let mut records = self.records();
        let Some(record) = records.get_mut(name) else {
            return Ok(false);
        };
        if !record.is_locked || record.locked_by.as_deref() != Some(holder) {
            return Ok(false);
        }
        record.expires_at = Some(expires_at);
        record.version += 1;
        Ok(true)
    }

    async fn reset_expired(&self, now: DateTime<Utc>, result: &str) -> Result<u64, LockError> {
        self.check_available()?;
        let mut reset = 0;
        for record in self.records().values_mut() {
            let expired = record.is_locked && record.expires_at.is_some_and(|e| e < now);
            if expired {
                record.is_locked = false;
                record.locked_by = None;
                record.locked_at = None;
                record.expires_at = None;
                record.version += 1;
                record.last_run_result = Some(result.to_string());
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn list(&self) -> Result<Vec<LockRecord>, LockError> {
        self.check_available()?;
        Ok(self.records().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_stale_version_loses() {
        let store = MemoryLockStore::new();
        store.ensure("rotation").await.unwrap();

        let won = store
            .compare_and_acquire("rotation", 0, "a:1", t0(), t0() + Duration::seconds(60))
            .await
            .unwrap();
        let lost = store
            .compare_and_acquire("rotation", 0, "b:2", t0(), t0() + Duration::seconds(60))
            .await
            .unwrap();

        assert!(won);
        assert!(!lost);
        let record = store.get("rotation").await.unwrap().unwrap();
        assert_eq!(record.locked_by.as_deref(), Some("a:1"));
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn test_ensure_keeps_existing_record() {
        let store = MemoryLockStore::new();
        store.ensure("rotation").await.unwrap();
        store
            .compare_and_acquire("rotation", 0, "a:1", t0(), t0() + Duration::seconds(60))
            .await
            .unwrap();
        store.ensure("rotation").await.unwrap();

        let record = store.get("rotation").await.unwrap().unwrap();
        assert!(record.is_locked);
    }

    #[tokio::test]
    async fn test_release_requires_owner() {
        let store = MemoryLockStore::new();
        store.ensure("top_up").await.unwrap();
        store
            .compare_and_acquire("top_up", 0, "a:1", t0(), t0() + Duration::seconds(60))
            .await
            .unwrap();

        assert!(!store.release_owned("top_up", "b:2", t0(), "success").await.unwrap());
        assert!(store.release_owned("top_up", "a:1", t0(), "success").await.unwrap());

        let record = store.get("top_up").await.unwrap().unwrap();
        assert!(!record.is_locked);
        assert_eq!(record.last_run_result.as_deref(), Some("success"));
        assert_eq!(record.last_run_at, Some(t0()));
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryLockStore::new();
        store.set_unavailable(true);
        assert!(store.ensure("rotation").await.is_err());
    }
}
