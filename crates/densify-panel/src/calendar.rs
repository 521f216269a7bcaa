//! Trading calendar and `YYYYMMDD` date keys.
//!
//! The calendar defines the row index of every panel. It is handed to the
//! builder and merger explicitly; nothing in the engine keeps a global copy.

use crate::error::{PanelError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar date rendered as `YYYYMMDD`.
///
/// Ordering of keys is chronological, which coincides with lexicographic
/// ordering of their string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateKey(NaiveDate);

impl DateKey {
    /// Wrap a chrono date.
    pub const fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Build a key from year, month and day.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// January 1st of `year`.
    pub fn year_start(year: i32) -> Option<Self> {
        Self::from_ymd(year, 1, 1)
    }

    /// Parse `YYYYMMDD` (also accepts `YYYY-MM-DD`).
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        NaiveDate::parse_from_str(trimmed, "%Y%m%d")
            .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
            .map(Self)
            .map_err(|_| PanelError::InvalidDateKey(raw.to_string()))
    }

    /// The underlying date.
    pub const fn date(&self) -> NaiveDate {
        self.0
    }

    /// Calendar year of the key.
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// The following calendar day.
    pub fn next_day(&self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d"))
    }
}

impl FromStr for DateKey {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DateKey {
    type Error = PanelError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DateKey> for String {
    fn from(key: DateKey) -> Self {
        key.to_string()
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

/// Strictly ascending, deduplicated sequence of trading dates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingCalendar {
    dates: Vec<DateKey>,
}

impl TradingCalendar {
    /// Build a calendar, sorting and deduplicating the input.
    pub fn new(dates: impl IntoIterator<Item = DateKey>) -> Self {
        let mut dates: Vec<DateKey> = dates.into_iter().collect();
        dates.sort_unstable();
        dates.dedup();
        Self { dates }
    }

    /// Build a calendar from `YYYYMMDD` strings.
    pub fn parse<I, S>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dates = keys
            .into_iter()
            .map(|k| DateKey::parse(k.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(dates))
    }

    /// All dates in order.
    pub fn dates(&self) -> &[DateKey] {
        &self.dates
    }

    /// Number of trading dates.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Whether the calendar has no dates.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// First trading date.
    pub fn first(&self) -> Option<DateKey> {
        self.dates.first().copied()
    }

    /// Last trading date.
    pub fn last(&self) -> Option<DateKey> {
        self.dates.last().copied()
    }

    /// Row position of `date`, if it is a trading date.
    pub fn position(&self, date: DateKey) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Whether `date` is a trading date.
    pub fn contains(&self, date: DateKey) -> bool {
        self.position(date).is_some()
    }

    /// First trading date on or after `date`.
    pub fn first_on_or_after(&self, date: DateKey) -> Option<DateKey> {
        let idx = self.dates.partition_point(|d| *d < date);
        self.dates.get(idx).copied()
    }

    /// Trading dates strictly after `date`.
    pub fn after(&self, date: DateKey) -> &[DateKey] {
        let idx = self.dates.partition_point(|d| *d <= date);
        &self.dates[idx..]
    }

    /// Calendar restricted to dates on or after `start`.
    pub fn since(&self, start: DateKey) -> Self {
        let idx = self.dates.partition_point(|d| *d < start);
        Self {
            dates: self.dates[idx..].to_vec(),
        }
    }

    /// Check that `dates` is exactly the first `dates.len()` trading dates.
    ///
    /// Returns the first offending date on mismatch.
    pub fn check_prefix(&self, dates: &[DateKey]) -> Result<()> {
        if dates.len() > self.dates.len() {
            let extra = dates[self.dates.len()];
            return Err(PanelError::CalendarMismatch {
                date: extra.to_string(),
                reason: "date is past the end of the calendar".to_string(),
            });
        }

        match dates.iter().zip(&self.dates).find(|(got, want)| got != want) {
            Some((got, want)) => Err(PanelError::CalendarMismatch {
                date: got.to_string(),
                reason: format!("expected trading date {want}"),
            }),
            None => Ok(()),
        }
    }
}

impl FromIterator<DateKey> for TradingCalendar {
    fn from_iter<T: IntoIterator<Item = DateKey>>(iter: T) -> Self {
        Self::new(iter)
    }
}
