//! tempo scheduler library.
//!
//! This crate primarily ships a `tempo-scheduler` binary, but we expose the
//! library surface so integration tests can wire the engine against
//! in-memory storage and a manual clock.

pub mod api;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod db;
pub mod jobs;
pub mod locks;
pub mod polls;
pub mod rotation;
pub mod state;
