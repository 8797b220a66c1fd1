//! The `[start, end)` window value type.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::WindowError;

/// Where an instant falls relative to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    /// The window has not opened yet.
    Before,
    /// The instant is inside `[start, end)`.
    Inside,
    /// The window has closed.
    After,
}

/// A half-open rotation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RotationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RotationWindow {
    /// Builds a window, rejecting empty or inverted bounds.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, WindowError> {
        if end <= start {
            return Err(WindowError::EmptyWindow);
        }
        Ok(Self { start, end })
    }

    /// Window of `length` starting at `start`. `length` must be positive.
    pub(crate) fn starting_at(start: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start,
            end: start + length,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn position(&self, at: DateTime<Utc>) -> WindowPosition {
        if at < self.start {
            WindowPosition::Before
        } else if at < self.end {
            WindowPosition::Inside
        } else {
            WindowPosition::After
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.position(at) == WindowPosition::Inside
    }

    /// True once `at` has reached the start, whether or not the window has closed.
    pub fn has_started(&self, at: DateTime<Utc>) -> bool {
        at >= self.start
    }

    pub fn has_ended(&self, at: DateTime<Utc>) -> bool {
        at >= self.end
    }

    /// The same-length window directly before this one.
    pub fn preceding(&self) -> Self {
        Self::starting_at(self.start - self.duration(), self.duration())
    }

    /// The same-length window directly after this one.
    pub fn following(&self) -> Self {
        Self::starting_at(self.end, self.duration())
    }
}

impl std::fmt::Display for RotationWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, m, s).unwrap()
    }

    #[test]
    fn test_rejects_empty_window() {
        assert_eq!(
            RotationWindow::new(at(10, 0, 0), at(10, 0, 0)),
            Err(WindowError::EmptyWindow)
        );
        assert!(RotationWindow::new(at(11, 0, 0), at(10, 0, 0)).is_err());
    }

    #[test]
    fn test_position_is_half_open() {
        let w = RotationWindow::new(at(10, 0, 0), at(11, 0, 0)).unwrap();
        assert_eq!(w.position(at(9, 59, 59)), WindowPosition::Before);
        assert_eq!(w.position(at(10, 0, 0)), WindowPosition::Inside);
        assert_eq!(w.position(at(10, 59, 59)), WindowPosition::Inside);
        assert_eq!(w.position(at(11, 0, 0)), WindowPosition::After);
        assert!(w.has_started(at(12, 0, 0)));
        assert!(w.has_ended(at(11, 0, 0)));
    }

    #[test]
    fn test_neighbours_touch() {
        let w = RotationWindow::new(at(10, 0, 0), at(11, 0, 0)).unwrap();
        assert_eq!(w.preceding().end, w.start);
        assert_eq!(w.following().start, w.end);
        assert_eq!(w.following().duration(), Duration::hours(1));
    }

    #[test]
    fn test_serializes_bounds() {
        let w = RotationWindow::new(at(10, 0, 0), at(11, 0, 0)).unwrap();
        let json = serde_json::to_value(w).unwrap();
        assert_eq!(json["start"], "2026-10-19T10:00:00Z");
        assert_eq!(json["end"], "2026-10-19T11:00:00Z");
    }
}
