//! In-memory poll repository.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempo_id::PollId;

use super::{NewPoll, Poll, PollKind, PollRepository, PollStatus, RepoError};
use crate::db::DbError;

/// Poll table held in memory, with the same uniqueness and
/// forward-only guarantees as the Postgres table.
#[derive(Debug, Default)]
pub struct MemoryPollRepository {
    polls: Mutex<HashMap<PollId, Poll>>,
    unavailable: AtomicBool,
}

impl MemoryPollRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Stores a poll as-is, bypassing every check. For test fixtures.
    pub fn insert_raw(&self, poll: Poll) {
        self.polls().insert(poll.id, poll);
    }

    fn check_available(&self) -> Result<(), RepoError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("memory poll repository offline".to_string()).into());
        }
        Ok(())
    }

    fn polls(&self) -> std::sync::MutexGuard<'_, HashMap<PollId, Poll>> {
        self.polls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sorted(mut polls: Vec<Poll>) -> Vec<Poll> {
        polls.sort_by_key(|p| (p.scheduled_start, p.kind));
        polls
    }
}

#[async_trait]
impl PollRepository for MemoryPollRepository {
    async fn create(&self, poll: NewPoll) -> Result<Poll, RepoError> {
        self.check_available()?;
        let mut polls = self.polls();
        let taken = polls
            .values()
            .any(|p| p.kind == poll.kind && p.scheduled_start == poll.window.start);
        if taken {
            return Err(RepoError::DuplicateWindow {
                kind: poll.kind,
                start: poll.window.start,
            });
        }
        let poll = poll.into_poll();
        polls.insert(poll.id, poll.clone());
        Ok(poll)
    }

    async fn update(&self, poll: &Poll) -> Result<Poll, RepoError> {
        self.check_available()?;
        let mut polls = self.polls();
        let stored = polls.get_mut(&poll.id).ok_or(RepoError::NotFound(poll.id))?;
        if stored.status != poll.status && !stored.status.can_transition(poll.status) {
            return Err(RepoError::InvalidTransition {
                id: poll.id,
                from: stored.status,
                to: poll.status,
            });
        }
        *stored = poll.clone();
        Ok(stored.clone())
    }

    async fn get(&self, id: PollId) -> Result<Poll, RepoError> {
        self.check_available()?;
        self.polls().get(&id).cloned().ok_or(RepoError::NotFound(id))
    }

    async fn find_by_window(
        &self,
        kind: PollKind,
        start: DateTime<Utc>,
    ) -> Result<Option<Poll>, RepoError> {
        self.check_available()?;
        Ok(self
            .polls()
            .values()
            .find(|p| p.kind == kind && p.scheduled_start == start)
            .cloned())
    }

    async fn get_units_created_since(
        &self,
        since: DateTime<Utc>,
        kind: Option<PollKind>,
    ) -> Result<Vec<Poll>, RepoError> {
        self.check_available()?;
        let mut found: Vec<Poll> = self
            .polls()
            .values()
            .filter(|p| p.created_at >= since && kind.map_or(true, |k| p.kind == k))
            .cloned()
            .collect();
        found.sort_by_key(|p| std::cmp::Reverse(p.created_at));
        Ok(found)
    }

    async fn close_expired(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        self.check_available()?;
        let mut closed = 0;
        for poll in self.polls().values_mut() {
            let open = matches!(poll.status, PollStatus::Scheduled | PollStatus::Active);
            if open && poll.scheduled_end <= now {
                poll.status = PollStatus::Closed;
                poll.closed_at = Some(now);
                poll.updated_at = now;
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn activate_due(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        self.check_available()?;
        let mut activated = 0;
        for poll in self.polls().values_mut() {
            if poll.status == PollStatus::Scheduled
                && poll.scheduled_start <= now
                && now < poll.scheduled_end
            {
                poll.status = PollStatus::Active;
                poll.activated_at = Some(now);
                poll.updated_at = now;
                activated += 1;
            }
        }
        Ok(activated)
    }

    async fn activated_since(&self, since: DateTime<Utc>) -> Result<Vec<Poll>, RepoError> {
        self.check_available()?;
        let found = self
            .polls()
            .values()
            .filter(|p| p.activated_at.is_some_and(|at| at >= since))
            .cloned()
            .collect();
        Ok(Self::sorted(found))
    }

    async fn count_upcoming(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        self.check_available()?;
        let count = self
            .polls()
            .values()
            .filter(|p| p.status == PollStatus::Scheduled && p.scheduled_start > now)
            .count();
        Ok(count as u64)
    }

    async fn list_by_status(&self, status: PollStatus) -> Result<Vec<Poll>, RepoError> {
        self.check_available()?;
        let found = self
            .polls()
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        Ok(Self::sorted(found))
    }

    async fn archive_closed_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepoError> {
        self.check_available()?;
        let mut archived = 0;
        for poll in self.polls().values_mut() {
            if poll.status == PollStatus::Closed && poll.scheduled_end < cutoff {
                poll.status = PollStatus::Archived;
                poll.archived_at = Some(now);
                poll.updated_at = now;
                archived += 1;
            }
        }
        Ok(archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempo_window::RotationWindow;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, 0, 0).unwrap()
    }

    fn new_poll(kind: PollKind, start: DateTime<Utc>, status: PollStatus) -> NewPoll {
        NewPoll {
            kind,
            category: "science".to_string(),
            question: "Will it rain?".to_string(),
            choices: vec!["Yes".to_string(), "No".to_string()],
            source_title: "Storm front".to_string(),
            source_signal: "weather desk".to_string(),
            synthesized: true,
            window: RotationWindow::new(start, start + Duration::hours(1)).unwrap(),
            initial_status: status,
            created_at: at(8),
        }
    }

    #[tokio::test]
    async fn test_duplicate_window_rejected() {
        let repo = MemoryPollRepository::new();
        repo.create(new_poll(PollKind::Flash, at(12), PollStatus::Scheduled))
            .await
            .unwrap();

        let err = repo
            .create(new_poll(PollKind::Flash, at(12), PollStatus::Scheduled))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::DuplicateWindow { kind: PollKind::Flash, .. }));

        // Same start, other kind: allowed.
        repo.create(new_poll(PollKind::Daily, at(12), PollStatus::Scheduled))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_refuses_backward_move() {
        let repo = MemoryPollRepository::new();
        let mut poll = repo
            .create(new_poll(PollKind::Flash, at(9), PollStatus::Active))
            .await
            .unwrap();
        assert_eq!(poll.activated_at, Some(at(8)));

        poll.status = PollStatus::Scheduled;
        let err = repo.update(&poll).await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidTransition { .. }));

        poll.status = PollStatus::Closed;
        assert_eq!(repo.update(&poll).await.unwrap().status, PollStatus::Closed);
    }

    #[tokio::test]
    async fn test_lifecycle_sweeps() {
        let repo = MemoryPollRepository::new();
        let poll = repo
            .create(new_poll(PollKind::Flash, at(9), PollStatus::Scheduled))
            .await
            .unwrap();

        assert_eq!(repo.count_upcoming(at(8)).await.unwrap(), 1);
        assert_eq!(repo.activate_due(at(8)).await.unwrap(), 0);
        assert_eq!(repo.activate_due(at(9)).await.unwrap(), 1);
        assert_eq!(repo.activated_since(at(9)).await.unwrap().len(), 1);
        assert_eq!(repo.close_expired(at(9)).await.unwrap(), 0);
        assert_eq!(repo.close_expired(at(10)).await.unwrap(), 1);

        let closed = repo.get(poll.id).await.unwrap();
        assert_eq!(closed.status, PollStatus::Closed);
        assert_eq!(closed.closed_at, Some(at(10)));

        assert_eq!(repo.archive_closed_before(at(10), at(11)).await.unwrap(), 0);
        assert_eq!(repo.archive_closed_before(at(11), at(11)).await.unwrap(), 1);
        assert_eq!(
            repo.list_by_status(PollStatus::Archived).await.unwrap()[0].archived_at,
            Some(at(11))
        );
    }

    #[tokio::test]
    async fn test_close_expired_reaches_stale_scheduled_polls() {
        let repo = MemoryPollRepository::new();
        repo.create(new_poll(PollKind::Flash, at(9), PollStatus::Scheduled))
            .await
            .unwrap();

        assert_eq!(repo.close_expired(at(10)).await.unwrap(), 1);
        assert_eq!(repo.activate_due(at(10)).await.unwrap(), 0);
        assert_eq!(repo.list_by_status(PollStatus::Closed).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_created_since_filters_kind() {
        let repo = MemoryPollRepository::new();
        repo.create(new_poll(PollKind::Flash, at(9), PollStatus::Scheduled))
            .await
            .unwrap();
        repo.create(new_poll(PollKind::Daily, at(12), PollStatus::Scheduled))
            .await
            .unwrap();

        assert_eq!(repo.get_units_created_since(at(7), None).await.unwrap().len(), 2);
        assert_eq!(
            repo.get_units_created_since(at(7), Some(PollKind::Daily))
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(repo.get_units_created_since(at(9), None).await.unwrap().is_empty());
    }
}
