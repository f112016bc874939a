//! Canonical `YYYY-MM` fee month

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar month a fee obligation belongs to
///
/// Internally the first day of the month, so ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeeMonth(NaiveDate);

impl FeeMonth {
    #[must_use]
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    /// Month containing `date`
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self(date - Days::new(u64::from(date.day0())))
    }

    #[must_use]
    pub fn year(self) -> i32 {
        self.0.year()
    }

    #[must_use]
    pub fn month(self) -> u32 {
        self.0.month()
    }

    #[must_use]
    pub fn first_day(self) -> NaiveDate {
        self.0
    }

    #[must_use]
    pub fn last_day(self) -> NaiveDate {
        self.succ().0 - Days::new(1)
    }

    #[must_use]
    pub fn succ(self) -> Self {
        Self(self.0 + Months::new(1))
    }

    #[must_use]
    pub fn contains(self, date: NaiveDate) -> bool {
        Self::of(date) == self
    }

    /// Whole calendar months from `self` to `later` (negative if `later` is earlier)
    #[must_use]
    pub fn months_until(self, later: FeeMonth) -> i32 {
        (later.year() - self.year()) * 12 + later.month() as i32 - self.month() as i32
    }
}

impl fmt::Display for FeeMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for FeeMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("fee month '{s}' is not in YYYY-MM form"))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| format!("fee month '{s}' has an invalid year"))?;
        let month = month
            .parse::<u32>()
            .map_err(|_| format!("fee month '{s}' has an invalid month"))?;
        FeeMonth::new(year, month).ok_or_else(|| format!("fee month '{s}' is out of range"))
    }
}

impl TryFrom<String> for FeeMonth {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FeeMonth> for String {
    fn from(month: FeeMonth) -> Self {
        month.to_string()
    }
}

/// Whole calendar months between two dates, ignoring the day of month
#[must_use]
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    FeeMonth::of(from).months_until(FeeMonth::of(to))
}
