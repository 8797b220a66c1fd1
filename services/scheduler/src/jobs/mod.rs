//! Job orchestration.
//!
//! Three jobs run in every replica:
//!
//! | job          | default trigger        | lock         |
//! |--------------|------------------------|--------------|
//! | rotation     | cron `5 0 * * * *`     | `rotation`   |
//! | top_up       | every 30 minutes       | `top_up`     |
//! | lock_sweep   | every 5 minutes        | `lock_sweep` |
//!
//! Replicas never talk to each other. Whichever replica wins a job's lock
//! runs the body; the others skip that firing.

mod orchestrator;
mod runner;
mod trigger;

pub use orchestrator::{JobHandle, JobOrchestrator, JobSchedule};
pub use runner::{JobKind, JobRunner, JobSettings, LOCK_SWEEP_LOCK, ROTATION_LOCK, TOP_UP_LOCK};
pub use trigger::{Trigger, TriggerError};
