//! Cadences: rules that turn an instant into rotation windows.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{RotationWindow, WindowError};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Back-to-back windows of one fixed length, aligned to the Unix epoch.
///
/// The window containing `t` starts at `t` truncated down to a multiple of
/// the period, so an hourly cadence yields `[10:00, 11:00)` for any instant
/// from `10:00:00` up to but excluding `11:00:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCadence {
    period_secs: i64,
}

impl FixedCadence {
    pub fn new(period: Duration) -> Result<Self, WindowError> {
        let period_secs = period.num_seconds();
        if period_secs <= 0 {
            return Err(WindowError::NonPositivePeriod {
                seconds: period_secs,
            });
        }
        Ok(Self { period_secs })
    }

    pub fn hourly() -> Self {
        Self { period_secs: 3600 }
    }

    pub fn period(&self) -> Duration {
        Duration::seconds(self.period_secs)
    }

    /// The window containing `at`.
    pub fn current(&self, at: DateTime<Utc>) -> RotationWindow {
        let into_period = at.timestamp().rem_euclid(self.period_secs);
        let start = at
            - Duration::seconds(into_period)
            - Duration::nanoseconds(i64::from(at.timestamp_subsec_nanos()));
        RotationWindow::starting_at(start, self.period())
    }

    pub fn previous(&self, at: DateTime<Utc>) -> RotationWindow {
        self.current(at).preceding()
    }

    pub fn next(&self, at: DateTime<Utc>) -> RotationWindow {
        self.current(at).following()
    }
}

impl Default for FixedCadence {
    fn default() -> Self {
        Self::hourly()
    }
}

/// One window per calendar day between two local hours of a civil zone.
///
/// The zone is fixed by configuration, so the result does not depend on the
/// zone of the host running the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCadence {
    tz: Tz,
    open_hour: u32,
    close_hour: u32,
}

impl DailyCadence {
    /// `close_hour` may be 24 to close at local midnight.
    pub fn new(tz: Tz, open_hour: u32, close_hour: u32) -> Result<Self, WindowError> {
        if open_hour >= close_hour || close_hour > 24 {
            return Err(WindowError::InvalidDailyHours {
                open: open_hour,
                close: close_hour,
            });
        }
        Ok(Self {
            tz,
            open_hour,
            close_hour,
        })
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn hours(&self) -> (u32, u32) {
        (self.open_hour, self.close_hour)
    }

    /// Calendar date of `at` in the cadence's zone.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    /// The window belonging to a local calendar date.
    pub fn window_on(&self, date: NaiveDate) -> Result<RotationWindow, WindowError> {
        let start = self.resolve_local(date, self.open_hour)?;
        let end = if self.close_hour == 24 {
            let next_day = date.succ_opt().ok_or_else(|| self.nonexistent(date, 0))?;
            self.resolve_local(next_day, 0)?
        } else {
            self.resolve_local(date, self.close_hour)?
        };
        RotationWindow::new(start, end)
    }

    /// The window of the local day containing `at`, open or not.
    pub fn today(&self, at: DateTime<Utc>) -> Result<RotationWindow, WindowError> {
        self.window_on(self.local_date(at))
    }

    /// Maps a local `date hour:00` to UTC. Ambiguous times (DST fall-back)
    /// take the earlier instant; times inside a DST gap move forward an hour.
    fn resolve_local(&self, date: NaiveDate, hour: u32) -> Result<DateTime<Utc>, WindowError> {
        let naive = date
            .and_hms_opt(hour, 0, 0)
            .ok_or_else(|| self.nonexistent(date, hour))?;

        let resolved = match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => Some(t),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => self
                .tz
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest(),
        };

        resolved
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| self.nonexistent(date, hour))
    }

    fn nonexistent(&self, date: NaiveDate, hour: u32) -> WindowError {
        WindowError::NonexistentLocalTime {
            local: format!("{date} {hour:02}:00"),
            zone: self.tz.name().to_string(),
        }
    }
}

impl Default for DailyCadence {
    fn default() -> Self {
        Self {
            tz: crate::DEFAULT_DAILY_TZ,
            open_hour: crate::DEFAULT_DAILY_OPEN_HOUR,
            close_hour: crate::DEFAULT_DAILY_CLOSE_HOUR,
        }
    }
}

/// Short windows opening at evenly spaced points of every UTC day.
///
/// With a 3 hour interval and a 1 hour duration the windows are
/// `[00:00, 01:00)`, `[03:00, 04:00)`, ... `[21:00, 22:00)` UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashCadence {
    slots: FixedCadence,
    duration_secs: i64,
}

impl FlashCadence {
    pub fn new(interval: Duration, duration: Duration) -> Result<Self, WindowError> {
        let slots = FixedCadence::new(interval)?;
        let interval_secs = slots.period_secs;
        if SECONDS_PER_DAY % interval_secs != 0 {
            return Err(WindowError::FlashIntervalNotDayAligned { interval_secs });
        }

        let duration_secs = duration.num_seconds();
        if duration_secs <= 0 || duration_secs > interval_secs {
            return Err(WindowError::InvalidFlashDuration {
                duration_secs,
                interval_secs,
            });
        }

        Ok(Self {
            slots,
            duration_secs,
        })
    }

    pub fn interval(&self) -> Duration {
        self.slots.period()
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs)
    }

    fn window_from(&self, opening: DateTime<Utc>) -> RotationWindow {
        RotationWindow::starting_at(opening, self.duration())
    }

    /// The flash window `at` is inside, if any.
    pub fn containing(&self, at: DateTime<Utc>) -> Option<RotationWindow> {
        let window = self.window_from(self.slots.current(at).start);
        window.contains(at).then_some(window)
    }

    /// The earliest flash window starting at or after `at`.
    pub fn next(&self, at: DateTime<Utc>) -> RotationWindow {
        let slot = self.slots.current(at);
        if slot.start == at {
            self.window_from(slot.start)
        } else {
            self.window_from(slot.end)
        }
    }

    /// The flash window opening one interval after `window`.
    pub fn after(&self, window: &RotationWindow) -> RotationWindow {
        self.window_from(window.start + self.interval())
    }

    /// Successive flash windows starting from [`FlashCadence::next`].
    pub fn upcoming(&self, at: DateTime<Utc>) -> impl Iterator<Item = RotationWindow> + '_ {
        std::iter::successors(Some(self.next(at)), move |w| Some(self.after(w)))
    }
}

impl Default for FlashCadence {
    fn default() -> Self {
        Self {
            slots: FixedCadence {
                period_secs: crate::DEFAULT_FLASH_INTERVAL_HOURS * 3600,
            },
            duration_secs: crate::DEFAULT_FLASH_DURATION_MINUTES * 60,
        }
    }
}
