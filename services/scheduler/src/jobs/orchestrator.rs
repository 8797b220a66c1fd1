//! Timer loops that fire the jobs.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use super::runner::{JobKind, JobRunner};
use super::trigger::Trigger;
use crate::clock::SharedClock;

/// When each job fires.
#[derive(Debug, Clone)]
pub struct JobSchedule {
    pub rotation: Trigger,
    pub top_up: Trigger,
    pub lock_sweep: Trigger,
}

impl JobSchedule {
    fn trigger(&self, job: JobKind) -> &Trigger {
        match job {
            JobKind::Rotation => &self.rotation,
            JobKind::TopUp => &self.top_up,
            JobKind::LockSweep => &self.lock_sweep,
        }
    }
}

/// A spawned job loop.
pub struct JobHandle {
    pub job: JobKind,
    pub handle: JoinHandle<()>,
}

/// Owns the per-job timer tasks of this process.
///
/// Each job has its own task that awaits the job body before computing the
/// next firing, so one process never runs two instances of a job and
/// firings missed while a body was running are dropped.
pub struct JobOrchestrator {
    runner: Arc<JobRunner>,
    schedule: JobSchedule,
    clock: SharedClock,
}

impl JobOrchestrator {
    pub fn new(runner: Arc<JobRunner>, schedule: JobSchedule, clock: SharedClock) -> Self {
        Self {
            runner,
            schedule,
            clock,
        }
    }

    /// Runs one rotation immediately, then spawns the three job loops.
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JobHandle> {
        info!("Running startup rotation");
        self.runner.run_logged(JobKind::Rotation).await;

        [JobKind::Rotation, JobKind::TopUp, JobKind::LockSweep]
            .into_iter()
            .map(|job| JobHandle {
                job,
                handle: tokio::spawn(run_job_loop(
                    job,
                    self.schedule.trigger(job).clone(),
                    self.runner.clone(),
                    self.clock.clone(),
                    shutdown.clone(),
                )),
            })
            .collect()
    }
}

#[instrument(skip(trigger, runner, clock, shutdown), fields(trigger = %trigger))]
async fn run_job_loop(
    job: JobKind,
    trigger: Trigger,
    runner: Arc<JobRunner>,
    clock: SharedClock,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(job = %job, "Starting job loop");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let Some(delay) = trigger.delay_after(clock.now()) else {
            warn!(job = %job, "Trigger has no future firing; stopping job loop");
            break;
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                runner.run_logged(job).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(job = %job, "Job loop shutting down");
}
