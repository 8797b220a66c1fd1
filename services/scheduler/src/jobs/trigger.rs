//! Job firing rules.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("invalid cron expression '{expression}': {message}")]
    InvalidCron { expression: String, message: String },

    #[error("interval must be positive")]
    ZeroInterval,
}

/// When a job fires next.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Six-field cron expression (with seconds), evaluated in UTC.
    Cron(Box<Schedule>),
    /// Fixed spacing measured from the end of the previous run.
    Interval(Duration),
}

impl Trigger {
    pub fn cron(expression: &str) -> Result<Self, TriggerError> {
        Schedule::from_str(expression)
            .map(|schedule| Trigger::Cron(Box::new(schedule)))
            .map_err(|e| TriggerError::InvalidCron {
                expression: expression.to_string(),
                message: e.to_string(),
            })
    }

    pub fn every(interval: Duration) -> Result<Self, TriggerError> {
        if interval.is_zero() {
            return Err(TriggerError::ZeroInterval);
        }
        Ok(Trigger::Interval(interval))
    }

    /// The first firing strictly after `now`. `None` if a cron schedule has
    /// no future occurrence.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Cron(schedule) => schedule.after(&now).next(),
            Trigger::Interval(interval) => {
                chrono::Duration::from_std(*interval)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
            }
        }
    }

    /// How long to sleep from `now` until the next firing.
    pub fn delay_after(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_after(now)
            .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Cron(schedule) => write!(f, "cron({schedule})"),
            Trigger::Interval(interval) => write!(f, "every {}s", interval.as_secs()),
        }
    }
}
