//! Wall-clock times and calendar dates as they arrive from forms and the API.
//!
//! Visit times are strict 24-hour `HH:MM` strings. Anything else is rejected
//! before it reaches the conflict arithmetic.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("expected a time in HH:MM format, got {0:?}")]
    Format(String),

    #[error("time out of range: {0:?}")]
    OutOfRange(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected a date in YYYY-MM-DD format, got {0:?}")]
pub struct DateParseError(pub String);

/// A time of day with minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VisitTime {
    minutes: u16,
}

impl VisitTime {
    pub const MIDNIGHT: VisitTime = VisitTime { minutes: 0 };

    pub const fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self {
            minutes: hour * 60 + minute,
        })
    }

    pub fn hour(&self) -> u16 {
        self.minutes / 60
    }

    pub fn minute(&self) -> u16 {
        self.minutes % 60
    }

    pub fn minutes_since_midnight(&self) -> u16 {
        self.minutes
    }

    /// Absolute distance in minutes, never wrapping across midnight.
    pub fn minutes_between(&self, other: &VisitTime) -> u16 {
        self.minutes.abs_diff(other.minutes)
    }

    /// `None` when the result would fall on the next day.
    pub fn checked_add_minutes(&self, minutes: u16) -> Option<Self> {
        let total = self.minutes.checked_add(minutes)?;
        (total < 24 * 60).then_some(Self { minutes: total })
    }
}

impl FromStr for VisitTime {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let well_formed = bytes.len() == 5
            && bytes[2] == b':'
            && [0, 1, 3, 4].iter().all(|&i| bytes[i].is_ascii_digit());
        if !well_formed {
            return Err(TimeParseError::Format(s.to_string()));
        }

        let digit = |i: usize| u16::from(bytes[i] - b'0');
        let hour = digit(0) * 10 + digit(1);
        let minute = digit(3) * 10 + digit(4);

        Self::from_hm(hour, minute).ok_or_else(|| TimeParseError::OutOfRange(s.to_string()))
    }
}

impl fmt::Display for VisitTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Parse a calendar date, dropping any time-of-day.
///
/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp; for the latter the
/// calendar day is taken in the timestamp's own offset.
pub fn parse_visit_date(s: &str) -> Result<NaiveDate, DateParseError> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.date_naive())
        .map_err(|_| DateParseError(s.to_string()))
}
