//! Rotation engine.
//!
//! Each cycle runs three steps in a fixed order:
//!
//! 1. close active polls whose window has ended
//! 2. activate scheduled polls whose window has begun
//! 3. generate a poll for the next unfilled slot
//!
//! Closing runs first so a poll is never reported active while its
//! successor is opening. Generation checks for an existing poll in the
//! target slot before doing any work; the repository's
//! `(kind, scheduled_start)` uniqueness is the backstop if two replicas
//! still race.

pub mod diversity;
mod engine;

pub use engine::{
    GenerationError, GenerationOutcome, RotationEngine, RotationError, RotationSettings,
    RotationSummary, Slot, TopUpReport,
};
