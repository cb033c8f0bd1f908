//! Common types shared by the Codeflow crates.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive time range used for generation and queries.
///
/// A window with `from > to` is empty rather than invalid: queries over it
/// return no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive)
    pub from: DateTime<Utc>,

    /// End of the window (inclusive)
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a window from two instants.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Creates a window covering `days` whole days starting at midnight UTC
    /// of `start`.
    pub fn from_days(start: NaiveDate, days: u32) -> Self {
        let from = Utc.from_utc_datetime(&start.and_time(chrono::NaiveTime::MIN));
        let to = from + Duration::days(i64::from(days)) - Duration::milliseconds(1);
        Self { from, to }
    }

    /// Returns a window that covers everything.
    pub fn unbounded() -> Self {
        Self {
            from: DateTime::<Utc>::MIN_UTC,
            to: DateTime::<Utc>::MAX_UTC,
        }
    }

    /// Returns true if the window can contain nothing.
    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    /// Returns true if `ts` lies within the window.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.from && ts <= self.to
    }

    /// Number of calendar days touched by the window (0 when empty).
    pub fn day_count(&self) -> u32 {
        if self.is_empty() {
            return 0;
        }
        let days = (self.to.date_naive() - self.from.date_naive()).num_days() + 1;
        u32::try_from(days).unwrap_or(u32::MAX)
    }

    /// Midnight UTC of the first day.
    pub fn start_of_first_day(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.from.date_naive().and_time(chrono::NaiveTime::MIN))
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} .. {}]", self.from.to_rfc3339(), self.to.to_rfc3339())
    }
}
