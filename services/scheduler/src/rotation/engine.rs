//! The rotation engine: window computation and the poll lifecycle.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tempo_window::{DailyCadence, FixedCadence, FlashCadence, RotationWindow, WindowError};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::diversity;
use crate::clock::SharedClock;
use crate::collaborators::{CollaboratorError, ContentGenerator, SignalSource};
use crate::polls::{NewPoll, Poll, PollKind, PollRepository, PollStatus, RepoError};

/// Upper bound on polls created by one cycle: today's daily, then a flash.
const MAX_GENERATIONS_PER_CYCLE: usize = 2;

/// Cadences and diversity knobs.
#[derive(Debug, Clone)]
pub struct RotationSettings {
    /// Generic window reported with every cycle.
    pub rotation: FixedCadence,
    pub daily: DailyCadence,
    pub flash: FlashCadence,
    /// Categories the signal source is asked about.
    pub categories: Vec<String>,
    pub category_lookback: Duration,
    pub title_lookback: Duration,
    /// Title overlap ratio at or above which a candidate is a repeat.
    pub similarity_threshold: f64,
    pub signal_limit: usize,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            rotation: FixedCadence::hourly(),
            daily: DailyCadence::default(),
            flash: FlashCadence::default(),
            categories: [
                "technology",
                "science",
                "sports",
                "entertainment",
                "business",
                "world",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            category_lookback: Duration::hours(24),
            title_lookback: Duration::hours(72),
            similarity_threshold: 0.5,
            signal_limit: 20,
        }
    }
}

/// A `(kind, window)` pair the engine wants filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub kind: PollKind,
    pub window: RotationWindow,
}

/// What a generation attempt ended with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "poll", rename_all = "snake_case")]
pub enum GenerationOutcome {
    /// A new poll was persisted.
    Created(Poll),
    /// The slot was already filled; nothing was written.
    Existing(Poll),
}

impl GenerationOutcome {
    pub fn poll(&self) -> &Poll {
        match self {
            GenerationOutcome::Created(poll) | GenerationOutcome::Existing(poll) => poll,
        }
    }

    pub fn into_poll(self) -> Poll {
        match self {
            GenerationOutcome::Created(poll) | GenerationOutcome::Existing(poll) => poll,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, GenerationOutcome::Created(_))
    }
}

impl fmt::Display for GenerationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationOutcome::Created(poll) => write!(f, "created {}", poll.id),
            GenerationOutcome::Existing(poll) => write!(f, "existing {}", poll.id),
        }
    }
}

/// Why generation produced nothing.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error("signal source failed: {0}")]
    Signals(#[source] CollaboratorError),

    #[error("content generator failed: {0}")]
    Generator(#[source] CollaboratorError),

    #[error("content generator returned no usable drafts")]
    NoDrafts,

    #[error("window computation failed: {0}")]
    Window(#[from] WindowError),

    #[error("{kind} window ended at {end}; nothing to generate")]
    SlotEnded { kind: PollKind, end: DateTime<Utc> },
}

/// Failure that aborts a rotation cycle.
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("content repository error: {0}")]
    Repository(#[from] RepoError),

    #[error("retention of {days} days reaches before the earliest representable time")]
    RetentionOutOfRange { days: i64 },
}

/// What one rotation cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct RotationSummary {
    pub window: RotationWindow,
    pub closed_count: u64,
    pub activated_count: u64,
    pub activated: Vec<Poll>,
    /// Newly created polls only; filled slots are not repeated here.
    pub generated: Vec<Poll>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RotationSummary {
    /// The first poll this cycle created, if any.
    pub fn generated_poll(&self) -> Option<&Poll> {
        self.generated.first()
    }

    /// Polls that became open during this cycle, for announcement.
    pub fn newly_opened(&self) -> Vec<&Poll> {
        self.activated
            .iter()
            .chain(self.generated.iter().filter(|p| p.status == PollStatus::Active))
            .collect()
    }
}

impl fmt::Display for RotationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "closed {}, activated {}, generated {}",
            self.closed_count,
            self.activated_count,
            self.generated.len()
        )
    }
}

/// Result of a top-up pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopUpReport {
    pub upcoming_before: u64,
    pub upcoming_after: u64,
    pub created: Vec<Poll>,
}

impl fmt::Display for TopUpReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "upcoming {} -> {}, created {}",
            self.upcoming_before,
            self.upcoming_after,
            self.created.len()
        )
    }
}

/// Drives polls through their windows.
///
/// Callers are expected to hold the matching lock; the engine itself does
/// no coordination beyond the repository's uniqueness guarantee.
#[derive(Clone)]
pub struct RotationEngine {
    polls: Arc<dyn PollRepository>,
    signals: Arc<dyn SignalSource>,
    generator: Arc<dyn ContentGenerator>,
    clock: SharedClock,
    settings: RotationSettings,
}

impl RotationEngine {
    pub fn new(
        polls: Arc<dyn PollRepository>,
        signals: Arc<dyn SignalSource>,
        generator: Arc<dyn ContentGenerator>,
        clock: SharedClock,
        settings: RotationSettings,
    ) -> Self {
        Self {
            polls,
            signals,
            generator,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &RotationSettings {
        &self.settings
    }

    pub fn current_window(&self) -> RotationWindow {
        self.settings.rotation.current(self.clock.now())
    }

    pub fn previous_window(&self) -> RotationWindow {
        self.settings.rotation.previous(self.clock.now())
    }

    pub fn next_window(&self) -> RotationWindow {
        self.settings.rotation.next(self.clock.now())
    }

    /// `scheduled → active` for polls whose window has begun.
    pub async fn activate_due(&self) -> Result<u64, RotationError> {
        let count = self.polls.activate_due(self.clock.now()).await?;
        if count > 0 {
            info!(count, "Activated due polls");
        }
        Ok(count)
    }

    /// `active → closed` for polls whose window has ended.
    pub async fn close_expired(&self) -> Result<u64, RotationError> {
        let count = self.polls.close_expired(self.clock.now()).await?;
        if count > 0 {
            info!(count, "Closed expired polls");
        }
        Ok(count)
    }

    /// The slot generation would fill right now: today's daily window while
    /// it is open and unfilled, else the next flash window.
    pub async fn plan_slot(&self) -> Result<Slot, GenerationError> {
        let now = self.clock.now();
        let today = self.settings.daily.today(now)?;

        if today.contains(now)
            && self
                .polls
                .find_by_window(PollKind::Daily, today.start)
                .await?
                .is_none()
        {
            return Ok(Slot {
                kind: PollKind::Daily,
                window: today,
            });
        }

        Ok(Slot {
            kind: PollKind::Flash,
            window: self.settings.flash.next(now),
        })
    }

    /// Fills the next slot unless it is already filled. Never fails: any
    /// error is logged and yields `None`.
    #[instrument(skip(self))]
    pub async fn generate_if_needed(&self) -> Option<GenerationOutcome> {
        match self.try_generate().await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(error = %e, "Poll generation failed; continuing without a new poll");
                None
            }
        }
    }

    /// Like [`RotationEngine::generate_if_needed`] but reports why nothing
    /// was produced.
    pub async fn force_generate(&self) -> Result<GenerationOutcome, GenerationError> {
        self.try_generate().await
    }

    async fn try_generate(&self) -> Result<GenerationOutcome, GenerationError> {
        let slot = self.plan_slot().await?;
        self.generate_for(slot).await
    }

    /// Fills `slot`, or returns the poll already filling it.
    pub async fn generate_for(&self, slot: Slot) -> Result<GenerationOutcome, GenerationError> {
        if let Some(existing) = self
            .polls
            .find_by_window(slot.kind, slot.window.start)
            .await?
        {
            debug!(kind = %slot.kind, poll_id = %existing.id, "Slot already filled");
            return Ok(GenerationOutcome::Existing(existing));
        }

        let now = self.clock.now();
        if slot.window.has_ended(now) {
            return Err(GenerationError::SlotEnded {
                kind: slot.kind,
                end: slot.window.end,
            });
        }
        let (recent_categories, recent_titles) = self.recent_usage(now).await?;

        let ask = diversity::fresh_categories(&self.settings.categories, &recent_categories);
        let signals = self
            .signals
            .fetch_trending(&ask, self.settings.signal_limit)
            .await
            .map_err(GenerationError::Signals)?;
        let fetched = signals.len();
        let signals = diversity::filter_signals(
            signals,
            &recent_titles,
            self.settings.similarity_threshold,
        );
        debug!(fetched, usable = signals.len(), "Filtered candidate signals");

        let avoid: Vec<String> = recent_categories.into_iter().collect();
        let drafts = self
            .generator
            .generate(&signals, &avoid)
            .await
            .map_err(GenerationError::Generator)?;

        let draft = drafts
            .into_iter()
            .find(|d| {
                d.source_title.is_empty()
                    || !diversity::is_repetitive(
                        &d.source_title,
                        &recent_titles,
                        self.settings.similarity_threshold,
                    )
            })
            .ok_or(GenerationError::NoDrafts)?;

        let initial_status = if slot.window.has_started(now) {
            PollStatus::Active
        } else {
            PollStatus::Scheduled
        };

        let new_poll = NewPoll {
            kind: slot.kind,
            category: draft.category,
            question: draft.question,
            choices: draft.choices,
            source_title: draft.source_title,
            source_signal: draft.source_signal,
            synthesized: true,
            window: slot.window,
            initial_status,
            created_at: now,
        };

        match self.polls.create(new_poll).await {
            Ok(poll) => {
                info!(
                    poll_id = %poll.id,
                    kind = %poll.kind,
                    category = %poll.category,
                    status = %poll.status,
                    window = %slot.window,
                    "Generated poll"
                );
                Ok(GenerationOutcome::Created(poll))
            }
            Err(RepoError::DuplicateWindow { kind, start }) => {
                debug!(kind = %kind, start = %start, "Lost generation race; using existing poll");
                let existing = self
                    .polls
                    .find_by_window(kind, start)
                    .await?
                    .ok_or(RepoError::DuplicateWindow { kind, start })?;
                Ok(GenerationOutcome::Existing(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Categories used within the category lookback and source titles used
    /// within the title lookback.
    async fn recent_usage(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(BTreeSet<String>, Vec<String>), RepoError> {
        let category_since = now - self.settings.category_lookback;
        let title_since = now - self.settings.title_lookback;

        let recent = self
            .polls
            .get_units_created_since(category_since.min(title_since), None)
            .await?;

        let categories = recent
            .iter()
            .filter(|p| p.created_at >= category_since)
            .map(|p| p.category.clone())
            .collect();
        let titles = recent
            .iter()
            .filter(|p| p.created_at >= title_since && !p.source_title.is_empty())
            .map(|p| p.source_title.clone())
            .collect();

        Ok((categories, titles))
    }

    /// Close, then activate, then generate.
    #[instrument(skip(self))]
    pub async fn run_rotation_cycle(&self) -> Result<RotationSummary, RotationError> {
        let started_at = self.clock.now();
        let window = self.settings.rotation.current(started_at);

        let closed_count = self.close_expired().await?;
        let activated_count = self.activate_due().await?;
        let activated = if activated_count > 0 {
            self.polls.activated_since(started_at).await?
        } else {
            Vec::new()
        };

        let mut generated = Vec::new();
        for _ in 0..MAX_GENERATIONS_PER_CYCLE {
            match self.generate_if_needed().await {
                Some(GenerationOutcome::Created(poll)) => generated.push(poll),
                Some(GenerationOutcome::Existing(_)) | None => break,
            }
        }

        let summary = RotationSummary {
            window,
            closed_count,
            activated_count,
            activated,
            generated,
            started_at,
            finished_at: self.clock.now(),
        };

        if summary.closed_count > 0 || summary.activated_count > 0 || !summary.generated.is_empty()
        {
            info!(
                window = %summary.window,
                closed = summary.closed_count,
                activated = summary.activated_count,
                generated = summary.generated.len(),
                "Rotation cycle complete"
            );
        } else {
            debug!(window = %summary.window, "Rotation cycle found nothing to do");
        }

        Ok(summary)
    }

    /// Ensures at least `min_upcoming` scheduled polls exist, filling the
    /// planned slot and then successive flash windows.
    #[instrument(skip(self))]
    pub async fn top_up(&self, min_upcoming: u64) -> Result<TopUpReport, RotationError> {
        let now = self.clock.now();
        let upcoming_before = self.polls.count_upcoming(now).await?;
        let mut report = TopUpReport {
            upcoming_before,
            upcoming_after: upcoming_before,
            created: Vec::new(),
        };

        if upcoming_before >= min_upcoming {
            debug!(upcoming = upcoming_before, min_upcoming, "Enough upcoming polls");
            return Ok(report);
        }

        if let Some(GenerationOutcome::Created(poll)) = self.generate_if_needed().await {
            report.created.push(poll);
        }

        let lookahead = usize::try_from(min_upcoming.saturating_add(1)).unwrap_or(usize::MAX);
        for window in self.settings.flash.upcoming(now).take(lookahead) {
            if self.polls.count_upcoming(now).await? >= min_upcoming {
                break;
            }
            let slot = Slot {
                kind: PollKind::Flash,
                window,
            };
            match self.generate_for(slot).await {
                Ok(GenerationOutcome::Created(poll)) => report.created.push(poll),
                Ok(GenerationOutcome::Existing(_)) => {}
                Err(e) => {
                    warn!(error = %e, window = %window, "Top-up generation failed");
                    break;
                }
            }
        }

        report.upcoming_after = self.polls.count_upcoming(now).await?;
        if !report.created.is_empty() {
            info!(
                created = report.created.len(),
                upcoming = report.upcoming_after,
                "Topped up scheduled polls"
            );
        }
        Ok(report)
    }

    /// Moves closed polls whose window ended more than `retention` ago to
    /// archived.
    pub async fn archive_closed(&self, retention: Duration) -> Result<u64, RotationError> {
        let now = self.clock.now();
        let cutoff = now
            .checked_sub_signed(retention)
            .ok_or(RotationError::RetentionOutOfRange {
                days: retention.num_days(),
            })?;
        let count = self.polls.archive_closed_before(cutoff, now).await?;
        if count > 0 {
            info!(count, retention_days = retention.num_days(), "Archived closed polls");
        }
        Ok(count)
    }
}
