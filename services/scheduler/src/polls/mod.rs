//! Poll records and the repository the rotation engine drives.
//!
//! A poll is one time-boxed unit of content. Its lifecycle only moves
//! forward: `scheduled → active → closed → archived`. The repository
//! enforces that, and also guarantees at most one poll per
//! `(kind, scheduled_start)`.

mod memory;

pub use memory::MemoryPollRepository;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempo_id::PollId;
use tempo_window::RotationWindow;
use thiserror::Error;

use crate::db::DbError;

/// Cadence a poll belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollKind {
    Daily,
    Flash,
}

impl PollKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollKind::Daily => "daily",
            PollKind::Flash => "flash",
        }
    }
}

impl fmt::Display for PollKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(PollKind::Daily),
            "flash" => Ok(PollKind::Flash),
            other => Err(format!("unknown poll kind: {other}")),
        }
    }
}

/// Lifecycle state of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Scheduled,
    Active,
    Closed,
    Archived,
}

impl PollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollStatus::Scheduled => "scheduled",
            PollStatus::Active => "active",
            PollStatus::Closed => "closed",
            PollStatus::Archived => "archived",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            PollStatus::Scheduled => 0,
            PollStatus::Active => 1,
            PollStatus::Closed => 2,
            PollStatus::Archived => 3,
        }
    }

    /// Whether a poll may move from `self` to `to`. Only forward moves are
    /// allowed; skipping a state counts as forward.
    pub fn can_transition(&self, to: PollStatus) -> bool {
        to.rank() > self.rank()
    }

    /// Statuses that may be stored over by `self` (itself included).
    pub fn predecessors(&self) -> Vec<PollStatus> {
        [
            PollStatus::Scheduled,
            PollStatus::Active,
            PollStatus::Closed,
            PollStatus::Archived,
        ]
        .into_iter()
        .filter(|s| s.rank() <= self.rank())
        .collect()
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(PollStatus::Scheduled),
            "active" => Ok(PollStatus::Active),
            "closed" => Ok(PollStatus::Closed),
            "archived" => Ok(PollStatus::Archived),
            other => Err(format!("unknown poll status: {other}")),
        }
    }
}

/// A persisted poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub kind: PollKind,
    pub status: PollStatus,
    pub category: String,
    pub question: String,
    pub choices: Vec<String>,
    /// Title of the signal the poll was drafted from.
    pub source_title: String,
    /// Free-text description of that signal.
    pub source_signal: String,
    pub synthesized: bool,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Poll {
    pub fn window(&self) -> RotationWindow {
        RotationWindow {
            start: self.scheduled_start,
            end: self.scheduled_end,
        }
    }
}

/// Input for [`PollRepository::create`].
#[derive(Debug, Clone)]
pub struct NewPoll {
    pub kind: PollKind,
    pub category: String,
    pub question: String,
    pub choices: Vec<String>,
    pub source_title: String,
    pub source_signal: String,
    pub synthesized: bool,
    pub window: RotationWindow,
    pub initial_status: PollStatus,
    pub created_at: DateTime<Utc>,
}

impl NewPoll {
    /// Materializes the record with a fresh id.
    pub(crate) fn into_poll(self) -> Poll {
        let activated_at = match self.initial_status {
            PollStatus::Active => Some(self.created_at),
            _ => None,
        };
        Poll {
            id: PollId::new(),
            kind: self.kind,
            status: self.initial_status,
            category: self.category,
            question: self.question,
            choices: self.choices,
            source_title: self.source_title,
            source_signal: self.source_signal,
            synthesized: self.synthesized,
            scheduled_start: self.window.start,
            scheduled_end: self.window.end,
            activated_at,
            closed_at: None,
            archived_at: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Content repository errors.
#[derive(Debug, Error)]
pub enum RepoError {
    /// A poll of this kind already starts at this instant.
    #[error("a {kind} poll already exists for window starting {start}")]
    DuplicateWindow {
        kind: PollKind,
        start: DateTime<Utc>,
    },

    #[error("poll not found: {0}")]
    NotFound(PollId),

    #[error("poll {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: PollId,
        from: PollStatus,
        to: PollStatus,
    },

    #[error(transparent)]
    Storage(#[from] DbError),
}

/// Persistence seam for polls.
#[async_trait]
pub trait PollRepository: Send + Sync {
    /// Inserts a poll. Fails with [`RepoError::DuplicateWindow`] when the
    /// `(kind, scheduled_start)` slot is taken.
    async fn create(&self, poll: NewPoll) -> Result<Poll, RepoError>;

    /// Writes back a poll's mutable fields. Status may only move forward.
    async fn update(&self, poll: &Poll) -> Result<Poll, RepoError>;

    async fn get(&self, id: PollId) -> Result<Poll, RepoError>;

    async fn find_by_window(
        &self,
        kind: PollKind,
        start: DateTime<Utc>,
    ) -> Result<Option<Poll>, RepoError>;

    /// Polls created at or after `since`, optionally of one kind.
    async fn get_units_created_since(
        &self,
        since: DateTime<Utc>,
        kind: Option<PollKind>,
    ) -> Result<Vec<Poll>, RepoError>;

    /// `active → closed` for every poll whose window ended by `now`. A
    /// scheduled poll whose whole window passed unattended closes too.
    async fn close_expired(&self, now: DateTime<Utc>) -> Result<u64, RepoError>;

    /// `scheduled → active` for every poll whose window contains `now`.
    async fn activate_due(&self, now: DateTime<Utc>) -> Result<u64, RepoError>;

    /// Polls whose `activated_at` is at or after `since`.
    async fn activated_since(&self, since: DateTime<Utc>) -> Result<Vec<Poll>, RepoError>;

    /// Scheduled polls that have not started by `now`.
    async fn count_upcoming(&self, now: DateTime<Utc>) -> Result<u64, RepoError>;

    /// Polls in `status`, earliest window first.
    async fn list_by_status(&self, status: PollStatus) -> Result<Vec<Poll>, RepoError>;

    /// `closed → archived` for closed polls whose window ended before `cutoff`.
    async fn archive_closed_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_moves_forward() {
        assert!(PollStatus::Scheduled.can_transition(PollStatus::Active));
        assert!(PollStatus::Active.can_transition(PollStatus::Closed));
        assert!(PollStatus::Closed.can_transition(PollStatus::Archived));
        assert!(PollStatus::Scheduled.can_transition(PollStatus::Closed));

        assert!(!PollStatus::Active.can_transition(PollStatus::Scheduled));
        assert!(!PollStatus::Archived.can_transition(PollStatus::Closed));
        assert!(!PollStatus::Active.can_transition(PollStatus::Active));
    }

    #[test]
    fn test_predecessors() {
        assert_eq!(
            PollStatus::Active.predecessors(),
            vec![PollStatus::Scheduled, PollStatus::Active]
        );
        assert_eq!(PollStatus::Scheduled.predecessors(), vec![PollStatus::Scheduled]);
    }

    #[test]
    fn test_text_roundtrip() {
        for status in [
            PollStatus::Scheduled,
            PollStatus::Active,
            PollStatus::Closed,
            PollStatus::Archived,
        ] {
            assert_eq!(status.as_str().parse::<PollStatus>().unwrap(), status);
        }
        assert_eq!("flash".parse::<PollKind>().unwrap(), PollKind::Flash);
        assert!("weekly".parse::<PollKind>().is_err());
        assert_eq!(serde_json::to_string(&PollStatus::Active).unwrap(), "\"active\"");
    }
}
