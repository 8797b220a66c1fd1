//! Rotation window arithmetic.
//!
//! A rotation window is the half-open interval `[start, end)` during which
//! one poll is open. Windows are derived purely from wall-clock time and a
//! cadence; nothing here touches storage, so every replica computes the same
//! window for the same instant.
//!
//! Three cadences are provided:
//!
//! - [`FixedCadence`]: back-to-back windows of a fixed length aligned to the
//!   Unix epoch (one hour by default).
//! - [`DailyCadence`]: one window per calendar day, open between two local
//!   hours in a civil time zone that is independent of the host's zone.
//! - [`FlashCadence`]: short windows opening at evenly spaced points of every
//!   UTC day.
//!
//! # Invariants
//!
//! - For a fixed cadence, `previous(t).end == current(t).start` and
//!   `current(t).end == next(t).start` for every `t`.
//! - Flash windows never overlap: the window duration never exceeds the
//!   spacing between openings.

mod cadence;
mod error;
mod window;

pub use cadence::{DailyCadence, FixedCadence, FlashCadence};
pub use error::WindowError;
pub use window::{RotationWindow, WindowPosition};

/// Re-export so callers can name zones without a direct dependency.
pub use chrono_tz::Tz;

/// Default civil zone for the daily window.
pub const DEFAULT_DAILY_TZ: Tz = chrono_tz::America::New_York;

/// Default local opening hour of the daily window.
pub const DEFAULT_DAILY_OPEN_HOUR: u32 = 8;

/// Default local closing hour of the daily window.
pub const DEFAULT_DAILY_CLOSE_HOUR: u32 = 20;

/// Default spacing between flash openings.
pub const DEFAULT_FLASH_INTERVAL_HOURS: i64 = 3;

/// Default flash window length.
pub const DEFAULT_FLASH_DURATION_MINUTES: i64 = 60;
