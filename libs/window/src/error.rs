//! Cadence configuration errors.

use thiserror::Error;

/// Errors raised when a cadence or window is constructed from bad inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// A window must end strictly after it starts.
    #[error("window end must be after start")]
    EmptyWindow,

    /// A fixed cadence needs a positive period.
    #[error("cadence period must be positive, got {seconds}s")]
    NonPositivePeriod { seconds: i64 },

    /// Daily hours must satisfy `open < close <= 24`.
    #[error("invalid daily hours: open {open}, close {close}")]
    InvalidDailyHours { open: u32, close: u32 },

    /// Flash windows would overlap or be empty.
    #[error("flash duration {duration_secs}s must be positive and at most the interval {interval_secs}s")]
    InvalidFlashDuration {
        duration_secs: i64,
        interval_secs: i64,
    },

    /// Flash openings must recur at the same points every UTC day.
    #[error("flash interval {interval_secs}s does not evenly divide a day")]
    FlashIntervalNotDayAligned { interval_secs: i64 },

    /// The local wall-clock time does not exist in the zone (DST gap) and
    /// no nearby instant could be found.
    #[error("local time {local} does not exist in zone {zone}")]
    NonexistentLocalTime { local: String, zone: String },
}
