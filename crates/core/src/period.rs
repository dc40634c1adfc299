//! Calendar periods: year-month keys, month windows and inclusive date ranges.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{AdSpendError, AdSpendResult};

/// A calendar month. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawYearMonth")]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> AdSpendResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(AdSpendError::InvalidPeriod(format!(
                "month {} is outside 1..=12",
                month
            )));
        }
        Ok(Self { year, month })
    }

    /// The month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn next(self) -> Self {
        Self::from_index(self.index() + 1)
    }

    pub fn previous(self) -> Self {
        Self::from_index(self.index() - 1)
    }

    /// Shift by `months`, which may be negative.
    pub fn offset(self, months: i64) -> Self {
        Self::from_index(self.index() + months)
    }

    fn index(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    fn from_index(index: i64) -> Self {
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }
}

#[derive(Deserialize)]
struct RawYearMonth {
    year: i32,
    month: u32,
}

impl TryFrom<RawYearMonth> for YearMonth {
    type Error = AdSpendError;

    fn try_from(raw: RawYearMonth) -> Result<Self, Self::Error> {
        Self::new(raw.year, raw.month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = AdSpendError;

    /// Parses `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| AdSpendError::InvalidPeriod(format!("expected YYYY-MM, got '{}'", s)))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| AdSpendError::InvalidPeriod(format!("bad year in '{}'", s)))?;
        let month = month
            .parse::<u32>()
            .map_err(|_| AdSpendError::InvalidPeriod(format!("bad month in '{}'", s)))?;
        Self::new(year, month)
    }
}

/// Inclusive window of calendar months. `from <= to` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMonthRange")]
pub struct MonthRange {
    pub from: YearMonth,
    pub to: YearMonth,
}

#[derive(Deserialize)]
struct RawMonthRange {
    from: YearMonth,
    to: YearMonth,
}

impl TryFrom<RawMonthRange> for MonthRange {
    type Error = AdSpendError;

    fn try_from(raw: RawMonthRange) -> Result<Self, Self::Error> {
        Self::new(raw.from, raw.to)
    }
}

impl MonthRange {
    pub fn new(from: YearMonth, to: YearMonth) -> AdSpendResult<Self> {
        if from > to {
            return Err(AdSpendError::InvalidPeriod(format!(
                "window starts {} after it ends {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    pub fn single(month: YearMonth) -> Self {
        Self {
            from: month,
            to: month,
        }
    }

    /// The `count` months ending at `last`, inclusive.
    pub fn trailing(last: YearMonth, count: u32) -> Self {
        let span = i64::from(count.max(1)) - 1;
        Self {
            from: last.offset(-span),
            to: last,
        }
    }

    pub fn contains(&self, month: YearMonth) -> bool {
        self.from <= month && month <= self.to
    }

    pub fn len(&self) -> usize {
        (self.to.index() - self.from.index() + 1) as usize
    }

    pub fn months(&self) -> Vec<YearMonth> {
        (self.from.index()..=self.to.index())
            .map(YearMonth::from_index)
            .collect()
    }

    /// The window of equal length immediately before this one.
    pub fn preceding(&self) -> Self {
        let len = self.len() as i64;
        Self {
            from: self.from.offset(-len),
            to: self.from.previous(),
        }
    }
}

/// Inclusive start/end date pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> AdSpendResult<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Re-checks `start <= end`; deserialized ranges skip `new`.
    pub fn validate(&self) -> AdSpendResult<()> {
        if self.start > self.end {
            return Err(AdSpendError::InvalidDateRange {
                from: self.start,
                to: self.end,
            });
        }
        Ok(())
    }

    /// Number of calendar days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Month the range is attributed to. Only the start date counts.
    pub fn period(&self) -> YearMonth {
        YearMonth::of(self.start)
    }

    pub fn crosses_month(&self) -> bool {
        YearMonth::of(self.start) != YearMonth::of(self.end)
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
