//! The lock registry: acquire, release, heartbeat and sweep.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Duration;
use futures_util::FutureExt;
use tracing::{debug, info, warn};

use super::{LockError, LockStatus, LockStore, EXPIRED_RESULT};
use crate::clock::SharedClock;

/// Longest failure description stored in `last_run_result`.
const MAX_NOTE_CHARS: usize = 500;

/// Shortest heartbeat period, so tiny TTLs do not spin.
const MIN_HEARTBEAT: std::time::Duration = std::time::Duration::from_secs(1);

/// Result of a scoped acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome<T> {
    /// The lock was taken and the operation ran to completion.
    Acquired(T),
    /// Someone else holds the lock (or storage was unreachable); nothing ran.
    Skipped,
}

impl<T> LockOutcome<T> {
    pub fn acquired(self) -> Option<T> {
        match self {
            LockOutcome::Acquired(value) => Some(value),
            LockOutcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, LockOutcome::Skipped)
    }
}

/// Lock-holder identity for this process: `<hostname>:<pid>`.
pub fn default_holder_id() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown-host".to_string());
    format!("{host}:{}", std::process::id())
}

/// Coordinates named locks for one process.
///
/// Every failure mode of acquisition collapses to `false`: a lost race is
/// silent, a storage error is logged and treated as "someone else has it".
#[derive(Clone)]
pub struct LockRegistry {
    store: Arc<dyn LockStore>,
    holder: String,
    clock: SharedClock,
}

impl LockRegistry {
    pub fn new(store: Arc<dyn LockStore>, holder: impl Into<String>, clock: SharedClock) -> Self {
        Self {
            store,
            holder: holder.into(),
            clock,
        }
    }

    /// This instance's identity as written to `locked_by`.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Attempts to take `name` for `ttl`.
    pub async fn try_acquire(&self, name: &str, ttl: Duration) -> bool {
        match self.try_acquire_inner(name, ttl).await {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(lock_name = %name, error = %e, "Lock storage error during acquire; skipping");
                false
            }
        }
    }

    async fn try_acquire_inner(&self, name: &str, ttl: Duration) -> Result<bool, LockError> {
        self.store.ensure(name).await?;

        let now = self.clock.now();
        let Some(record) = self.store.get(name).await? else {
            debug!(lock_name = %name, "Lock record vanished after ensure");
            return Ok(false);
        };

        if record.is_held_at(now) {
            debug!(
                lock_name = %name,
                locked_by = record.locked_by.as_deref().unwrap_or(""),
                "Lock held elsewhere"
            );
            return Ok(false);
        }

        let acquired = self
            .store
            .compare_and_acquire(name, record.version, &self.holder, now, now + ttl)
            .await?;

        if acquired {
            debug!(lock_name = %name, holder = %self.holder, version = record.version + 1, "Lock acquired");
        } else {
            debug!(lock_name = %name, "Lost lock race");
        }
        Ok(acquired)
    }

    /// Releases `name` and records the outcome. `false` if this instance
    /// no longer owns it.
    pub async fn release(&self, name: &str, success: bool, notes: Option<&str>) -> bool {
        let result = outcome_text(success, notes);
        let now = self.clock.now();

        match self.store.release_owned(name, &self.holder, now, &result).await {
            Ok(true) => {
                debug!(lock_name = %name, success, "Lock released");
                true
            }
            Ok(false) => {
                warn!(lock_name = %name, holder = %self.holder, "Release skipped: lock not owned by this instance");
                false
            }
            Err(e) => {
                warn!(lock_name = %name, error = %e, "Lock storage error during release");
                false
            }
        }
    }

    /// Pushes the expiry of a held lock to `now + ttl`.
    pub async fn extend(&self, name: &str, ttl: Duration) -> bool {
        let expires_at = self.clock.now() + ttl;

        match self.store.extend_owned(name, &self.holder, expires_at).await {
            Ok(true) => {
                debug!(lock_name = %name, expires_at = %expires_at, "Lock extended");
                true
            }
            Ok(false) => {
                warn!(lock_name = %name, holder = %self.holder, "Extend skipped: lock not owned by this instance");
                false
            }
            Err(e) => {
                warn!(lock_name = %name, error = %e, "Lock storage error during extend");
                false
            }
        }
    }

    /// Unlocks every lock whose TTL has passed. Needs no lock itself.
    pub async fn cleanup_expired(&self) -> Result<u64, LockError> {
        let now = self.clock.now();
        let reset = self.store.reset_expired(now, EXPIRED_RESULT).await?;

        if reset > 0 {
            info!(count = reset, "Reclaimed expired locks");
        }
        Ok(reset)
    }

    /// Every known lock as seen at the current instant.
    pub async fn status(&self) -> Result<Vec<LockStatus>, LockError> {
        let now = self.clock.now();
        let records = self.store.list().await?;
        Ok(records
            .into_iter()
            .map(|record| LockStatus::from_record(record, now))
            .collect())
    }

    /// Runs `op` while holding `name`.
    ///
    /// Returns `Ok(Skipped)` without running `op` when the lock cannot be
    /// taken. While `op` is pending the lock is extended every `ttl / 3`.
    /// The lock is released on every exit: with the operation's `Display`
    /// text on success, with the truncated error text on failure, and
    /// before re-raising if `op` panics.
    pub async fn acquire_lock<F, T, E>(
        &self,
        name: &str,
        ttl: Duration,
        op: F,
    ) -> Result<LockOutcome<T>, E>
    where
        F: Future<Output = Result<T, E>>,
        T: Display,
        E: Display,
    {
        if !self.try_acquire(name, ttl).await {
            return Ok(LockOutcome::Skipped);
        }

        let period = (ttl / 3).to_std().unwrap_or(MIN_HEARTBEAT).max(MIN_HEARTBEAT);
        let mut heartbeat =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let op = AssertUnwindSafe(op).catch_unwind();
        tokio::pin!(op);

        let finished = loop {
            tokio::select! {
                finished = &mut op => break finished,
                _ = heartbeat.tick() => {
                    if !self.extend(name, ttl).await {
                        warn!(lock_name = %name, "Heartbeat failed; lock may be reclaimed before the job finishes");
                    }
                }
            }
        };

        match finished {
            Ok(Ok(value)) => {
                let notes = value.to_string();
                self.release(name, true, Some(&notes)).await;
                Ok(LockOutcome::Acquired(value))
            }
            Ok(Err(e)) => {
                let notes = e.to_string();
                self.release(name, false, Some(&notes)).await;
                Err(e)
            }
            Err(panic) => {
                self.release(name, false, Some("panicked")).await;
                std::panic::resume_unwind(panic)
            }
        }
    }
}

fn outcome_text(success: bool, notes: Option<&str>) -> String {
    let notes = notes.map(truncate).filter(|n| !n.is_empty());
    match (success, notes) {
        (true, None) => "success".to_string(),
        (true, Some(notes)) => format!("success: {notes}"),
        (false, None) => "failed".to_string(),
        (false, Some(notes)) => format!("failed: {notes}"),
    }
}

fn truncate(notes: &str) -> String {
    notes.chars().take(MAX_NOTE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::locks::MemoryLockStore;
    use chrono::{TimeZone, Utc};

    fn registry(store: Arc<MemoryLockStore>, holder: &str, clock: &ManualClock) -> LockRegistry {
        LockRegistry::new(store, holder, Arc::new(clock.clone()))
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap())
    }

    #[test]
    fn test_outcome_text() {
        assert_eq!(outcome_text(true, None), "success");
        assert_eq!(outcome_text(true, Some("closed 1")), "success: closed 1");
        assert_eq!(outcome_text(false, Some("boom")), "failed: boom");
        assert_eq!(outcome_text(false, Some("")), "failed");
    }

    #[test]
    fn test_failure_notes_truncated() {
        let long = "x".repeat(2_000);
        let text = outcome_text(false, Some(&long));
        assert_eq!(text.len(), "failed: ".len() + MAX_NOTE_CHARS);
    }

    #[test]
    fn test_default_holder_has_pid() {
        let id = default_holder_id();
        assert!(id.ends_with(&format!(":{}", std::process::id())));
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive_until_release() {
        let store = Arc::new(MemoryLockStore::new());
        let clock = clock();
        let a = registry(store.clone(), "a:1", &clock);
        let b = registry(store.clone(), "b:2", &clock);

        assert!(a.try_acquire("rotation", Duration::seconds(300)).await);
        assert!(!b.try_acquire("rotation", Duration::seconds(300)).await);

        assert!(a.release("rotation", true, None).await);
        assert!(b.try_acquire("rotation", Duration::seconds(300)).await);
    }

    #[tokio::test]
    async fn test_release_by_non_owner_is_noop() {
        let store = Arc::new(MemoryLockStore::new());
        let clock = clock();
        let a = registry(store.clone(), "a:1", &clock);
        let b = registry(store.clone(), "b:2", &clock);

        assert!(a.try_acquire("rotation", Duration::seconds(300)).await);
        assert!(!b.release("rotation", true, None).await);
        assert!(!b.extend("rotation", Duration::seconds(300)).await);

        let record = store.get("rotation").await.unwrap().unwrap();
        assert_eq!(record.locked_by.as_deref(), Some("a:1"));
    }

    #[tokio::test]
    async fn test_extend_keeps_lock_alive() {
        let store = Arc::new(MemoryLockStore::new());
        let clock = clock();
        let a = registry(store.clone(), "a:1", &clock);
        let b = registry(store.clone(), "b:2", &clock);

        assert!(a.try_acquire("rotation", Duration::seconds(300)).await);
        clock.advance(Duration::seconds(250));
        assert!(a.extend("rotation", Duration::seconds(300)).await);
        clock.advance(Duration::seconds(100));
        assert!(!b.try_acquire("rotation", Duration::seconds(300)).await);
    }

    #[tokio::test]
    async fn test_storage_error_fails_closed() {
        let store = Arc::new(MemoryLockStore::new());
        let clock = clock();
        let a = registry(store.clone(), "a:1", &clock);

        store.set_unavailable(true);
        assert!(!a.try_acquire("rotation", Duration::seconds(300)).await);
        assert!(!a.release("rotation", true, None).await);
        assert!(a.cleanup_expired().await.is_err());
    }

    #[tokio::test]
    async fn test_acquire_lock_records_success() {
        let store = Arc::new(MemoryLockStore::new());
        let clock = clock();
        let a = registry(store.clone(), "a:1", &clock);

        let outcome = a
            .acquire_lock("rotation", Duration::seconds(300), async {
                Ok::<_, String>("closed 1".to_string())
            })
            .await
            .unwrap();

        assert_eq!(outcome, LockOutcome::Acquired("closed 1".to_string()));
        let record = store.get("rotation").await.unwrap().unwrap();
        assert!(!record.is_locked);
        assert_eq!(record.last_run_result.as_deref(), Some("success: closed 1"));
    }

    #[tokio::test]
    async fn test_acquire_lock_releases_on_error() {
        let store = Arc::new(MemoryLockStore::new());
        let clock = clock();
        let a = registry(store.clone(), "a:1", &clock);

        let err = a
            .acquire_lock("rotation", Duration::seconds(300), async {
                Err::<String, _>("repository unreachable".to_string())
            })
            .await
            .unwrap_err();

        assert_eq!(err, "repository unreachable");
        let record = store.get("rotation").await.unwrap().unwrap();
        assert!(!record.is_locked);
        assert_eq!(
            record.last_run_result.as_deref(),
            Some("failed: repository unreachable")
        );
    }

    #[tokio::test]
    async fn test_acquire_lock_skips_when_held() {
        let store = Arc::new(MemoryLockStore::new());
        let clock = clock();
        let a = registry(store.clone(), "a:1", &clock);
        let b = registry(store.clone(), "b:2", &clock);

        assert!(a.try_acquire("rotation", Duration::seconds(300)).await);

        let mut ran = false;
        let outcome = b
            .acquire_lock("rotation", Duration::seconds(300), async {
                ran = true;
                Ok::<_, String>(String::new())
            })
            .await
            .unwrap();

        assert!(outcome.is_skipped());
        assert!(!ran);
    }

    #[tokio::test]
    async fn test_acquire_lock_releases_on_panic() {
        let store = Arc::new(MemoryLockStore::new());
        let clock = clock();
        let a = registry(store.clone(), "a:1", &clock);

        let handle = tokio::spawn(async move {
            a.acquire_lock("rotation", Duration::seconds(300), async {
                if true {
                    panic!("job exploded");
                }
                Ok::<String, String>(String::new())
            })
            .await
        });
        assert!(handle.await.is_err());

        let record = store.get("rotation").await.unwrap().unwrap();
        assert!(!record.is_locked);
        assert_eq!(record.last_run_result.as_deref(), Some("failed: panicked"));
    }
}
