//! Job bodies: each one wrapped in its named lock.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, error, info, warn};

use crate::collaborators::{Notifier, NotifyReport};
use crate::locks::{LockError, LockOutcome, LockRegistry, LockStatus};
use crate::polls::{Poll, PollStatus};
use crate::rotation::{
    GenerationError, GenerationOutcome, RotationEngine, RotationError, RotationSummary,
    TopUpReport,
};

pub const ROTATION_LOCK: &str = "rotation";
pub const TOP_UP_LOCK: &str = "top_up";
pub const LOCK_SWEEP_LOCK: &str = "lock_sweep";

/// The periodic jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Rotation,
    TopUp,
    LockSweep,
}

impl JobKind {
    pub fn lock_name(&self) -> &'static str {
        match self {
            JobKind::Rotation => ROTATION_LOCK,
            JobKind::TopUp => TOP_UP_LOCK,
            JobKind::LockSweep => LOCK_SWEEP_LOCK,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.lock_name())
    }
}

/// Lock TTLs and the top-up floor.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub rotation_lock_ttl: Duration,
    pub top_up_lock_ttl: Duration,
    pub sweep_lock_ttl: Duration,
    pub min_upcoming: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            rotation_lock_ttl: Duration::seconds(300),
            top_up_lock_ttl: Duration::seconds(600),
            sweep_lock_ttl: Duration::seconds(60),
            min_upcoming: 2,
        }
    }
}

/// Runs engine operations under the lock registry and announces results.
///
/// Both the timers and the admin API go through here, so a manual trigger
/// contends for the same lock as the timed job.
pub struct JobRunner {
    locks: LockRegistry,
    engine: RotationEngine,
    notifier: Arc<dyn Notifier>,
    settings: JobSettings,
}

impl JobRunner {
    pub fn new(
        locks: LockRegistry,
        engine: RotationEngine,
        notifier: Arc<dyn Notifier>,
        settings: JobSettings,
    ) -> Self {
        Self {
            locks,
            engine,
            notifier,
            settings,
        }
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub fn engine(&self) -> &RotationEngine {
        &self.engine
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// One rotation cycle under the `rotation` lock, then announcements
    /// once the lock is released.
    pub async fn run_rotation(&self) -> Result<LockOutcome<RotationSummary>, RotationError> {
        let outcome = self
            .locks
            .acquire_lock(
                ROTATION_LOCK,
                self.settings.rotation_lock_ttl,
                self.engine.run_rotation_cycle(),
            )
            .await?;

        if let LockOutcome::Acquired(summary) = &outcome {
            self.announce(summary.newly_opened()).await;
        }
        Ok(outcome)
    }

    /// Fills upcoming slots under the `top_up` lock.
    pub async fn run_top_up(&self) -> Result<LockOutcome<TopUpReport>, RotationError> {
        let outcome = self
            .locks
            .acquire_lock(
                TOP_UP_LOCK,
                self.settings.top_up_lock_ttl,
                self.engine.top_up(self.settings.min_upcoming),
            )
            .await?;

        if let LockOutcome::Acquired(report) = &outcome {
            let opened: Vec<&Poll> = report
                .created
                .iter()
                .filter(|p| p.status == PollStatus::Active)
                .collect();
            self.announce(opened).await;
        }
        Ok(outcome)
    }

    /// Reclaims expired locks. Wrapped in its own lock so replicas do not
    /// all sweep at once; the sweep itself does not depend on it.
    pub async fn run_lock_sweep(&self) -> Result<LockOutcome<u64>, LockError> {
        self.locks
            .acquire_lock(
                LOCK_SWEEP_LOCK,
                self.settings.sweep_lock_ttl,
                self.locks.cleanup_expired(),
            )
            .await
    }

    /// Forced generation under the `rotation` lock.
    pub async fn force_generate(
        &self,
    ) -> Result<LockOutcome<GenerationOutcome>, GenerationError> {
        let outcome = self
            .locks
            .acquire_lock(
                ROTATION_LOCK,
                self.settings.rotation_lock_ttl,
                self.engine.force_generate(),
            )
            .await?;

        if let LockOutcome::Acquired(GenerationOutcome::Created(poll)) = &outcome {
            if poll.status == PollStatus::Active {
                self.announce(vec![poll]).await;
            }
        }
        Ok(outcome)
    }

    /// Archives closed polls under the `rotation` lock, since it mutates polls.
    pub async fn archive_closed(
        &self,
        retention: Duration,
    ) -> Result<LockOutcome<u64>, RotationError> {
        self.locks
            .acquire_lock(
                ROTATION_LOCK,
                self.settings.rotation_lock_ttl,
                self.engine.archive_closed(retention),
            )
            .await
    }

    /// Sweep without taking any lock.
    pub async fn cleanup_locks(&self) -> Result<u64, LockError> {
        self.locks.cleanup_expired().await
    }

    pub async fn lock_status(&self) -> Result<Vec<LockStatus>, LockError> {
        self.locks.status().await
    }

    /// Announces each poll through the notifier. Must be called without
    /// holding any lock.
    pub async fn announce(&self, polls: Vec<&Poll>) -> NotifyReport {
        let mut total = NotifyReport::default();
        for poll in polls {
            let report = self.notifier.notify(poll, poll.kind).await;
            if !report.errors.is_empty() {
                warn!(poll_id = %poll.id, errors = ?report.errors, "Announcement had delivery errors");
            }
            total.sent += report.sent;
            total.skipped += report.skipped;
            total.errors.extend(report.errors);
        }
        if total.sent > 0 || !total.errors.is_empty() {
            info!(
                sent = total.sent,
                skipped = total.skipped,
                errors = total.errors.len(),
                "Announced opened polls"
            );
        }
        total
    }

    /// Runs `job` and logs how it went. Used by the timers.
    pub async fn run_logged(&self, job: JobKind) {
        match job {
            JobKind::Rotation => match self.run_rotation().await {
                Ok(LockOutcome::Acquired(summary)) => debug!(job = %job, %summary, "Job finished"),
                Ok(LockOutcome::Skipped) => debug!(job = %job, "Job skipped; lock held elsewhere"),
                Err(e) => error!(job = %job, error = %e, "Job failed"),
            },
            JobKind::TopUp => match self.run_top_up().await {
                Ok(LockOutcome::Acquired(report)) => debug!(job = %job, %report, "Job finished"),
                Ok(LockOutcome::Skipped) => debug!(job = %job, "Job skipped; lock held elsewhere"),
                Err(e) => error!(job = %job, error = %e, "Job failed"),
            },
            JobKind::LockSweep => match self.run_lock_sweep().await {
                Ok(LockOutcome::Acquired(count)) => debug!(job = %job, count, "Job finished"),
                Ok(LockOutcome::Skipped) => debug!(job = %job, "Job skipped; lock held elsewhere"),
                Err(e) => error!(job = %job, error = %e, "Job failed"),
            },
        }
    }
}
