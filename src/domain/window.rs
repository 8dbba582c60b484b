//! Time ranges and export windows
//!
//! A requested export range is split into contiguous, non-overlapping
//! [`ExportWindow`]s of at most `chunk_size`. Window ends are exclusive.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::StrataError;
use super::result::Result;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a range, rejecting `end <= start`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(StrataError::InvalidRange(format!(
                "end {} must be after start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// The range ending at `end` and reaching back `days`
    pub fn days_back(end: DateTime<Utc>, days: u32) -> Result<Self> {
        let start = end
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| {
                StrataError::InvalidRange(format!(
                    "{days} days before {} is out of range",
                    end.to_rfc3339()
                ))
            })?;
        Self::new(start, end)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Span in fractional days
    pub fn days(&self) -> f64 {
        self.duration().num_seconds() as f64 / SECONDS_PER_DAY
    }

    /// Rejects ranges longer than `max_days`
    pub fn ensure_max_span(&self, max_days: u32) -> Result<()> {
        if self.duration() > Duration::days(i64::from(max_days)) {
            return Err(StrataError::InvalidRange(format!(
                "span of {:.1} days exceeds the maximum of {max_days} days",
                self.days()
            )));
        }
        Ok(())
    }

    /// Splits the range into windows of at most `chunk_size`
    ///
    /// Windows are returned in ascending order; each window's start equals
    /// the previous window's end and the last window ends at `self.end`.
    pub fn split(&self, chunk_size: Duration) -> Result<Vec<ExportWindow>> {
        if chunk_size <= Duration::zero() {
            return Err(StrataError::InvalidRange(
                "chunk size must be positive".to_string(),
            ));
        }

        let mut windows = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let next = if self.end - cursor > chunk_size {
                cursor + chunk_size
            } else {
                self.end
            };
            windows.push(ExportWindow {
                index: windows.len(),
                start: cursor,
                end: next,
                chunk_size,
            });
            cursor = next;
        }
        Ok(windows)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// One bounded slice of an export run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportWindow {
    /// Position within the run, starting at 0
    pub index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Maximum span the window was cut with
    pub chunk_size: Duration,
}

impl ExportWindow {
    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

impl fmt::Display for ExportWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.range())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::days(i64::from(d))
    }

    #[test]
    fn test_range_rejects_end_before_start() {
        let err = TimeRange::new(day(5), day(1)).unwrap_err();
        assert!(matches!(err, StrataError::InvalidRange(_)));
        assert!(TimeRange::new(day(1), day(1)).is_err());
    }

    #[test]
    fn test_range_max_span() {
        let range = TimeRange::new(day(0), day(30)).unwrap();
        assert!(range.ensure_max_span(30).is_ok());
        assert!(matches!(
            range.ensure_max_span(29),
            Err(StrataError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_split_rejects_non_positive_chunk() {
        let range = TimeRange::new(day(0), day(3)).unwrap();
        assert!(range.split(Duration::zero()).is_err());
        assert!(range.split(Duration::days(-1)).is_err());
    }

    #[test_case(0, 1, 7 * 24 * 60 ; "shorter than one chunk")]
    #[test_case(0, 7, 7 * 24 * 60 ; "exactly one chunk")]
    #[test_case(0, 30, 7 * 24 * 60 ; "uneven tail")]
    #[test_case(3, 365, 7 * 24 * 60 ; "full year")]
    #[test_case(0, 2, 37 ; "odd minute chunks")]
    fn test_split_windows_cover_range_exactly(start: u32, end: u32, chunk_minutes: i64) {
        let range = TimeRange::new(day(start), day(end)).unwrap();
        let chunk = Duration::minutes(chunk_minutes);
        let windows = range.split(chunk).unwrap();

        assert!(!windows.is_empty());
        assert_eq!(windows.first().unwrap().start, range.start);
        assert_eq!(windows.last().unwrap().end, range.end);
        for (i, pair) in windows.windows(2).enumerate() {
            assert_eq!(pair[0].end, pair[1].start, "gap or overlap after window {i}");
        }
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.index, i);
            assert!(w.start < w.end);
            assert!(w.end - w.start <= chunk);
        }
        let total: i64 = windows.iter().map(|w| (w.end - w.start).num_seconds()).sum();
        assert_eq!(total, range.duration().num_seconds());
    }

    #[test]
    fn test_window_contains_is_end_exclusive() {
        let range = TimeRange::new(day(0), day(14)).unwrap();
        let windows = range.split(Duration::days(7)).unwrap();
        assert_eq!(windows.len(), 2);
        assert!(windows[0].contains(day(0)));
        assert!(!windows[0].contains(day(7)));
        assert!(windows[1].contains(day(7)));
    }

    #[test]
    fn test_days_back() {
        let range = TimeRange::days_back(day(30), 30).unwrap();
        assert_eq!(range.start, day(0));
        assert!((range.days() - 30.0).abs() < f64::EPSILON);
    }

    #[test_case(u32::MAX ; "u32 max")]
    #[test_case(100_000_000 ; "beyond chrono range")]
    fn test_days_back_out_of_range_is_rejected(days: u32) {
        let err = TimeRange::days_back(day(30), days).unwrap_err();
        assert!(matches!(err, StrataError::InvalidRange(_)));
    }
}
