//! Calendar months encoded as `YYYYMM` integers.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonthError {
    #[error("month must be in YYYYMM format, got {0:?}")]
    Format(String),
    #[error("month {0} is out of range")]
    OutOfRange(u32),
}

/// A calendar month, stored the same way the counter tables store it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Month(u32);

impl Month {
    pub fn new(year: u32, month: u32) -> Result<Self, MonthError> {
        if month > 12 || year > 9999 {
            return Err(MonthError::OutOfRange(year.saturating_mul(100).saturating_add(month)));
        }
        Self::from_yyyymm(year * 100 + month)
    }

    /// Validate a raw `YYYYMM` value.
    pub fn from_yyyymm(value: u32) -> Result<Self, MonthError> {
        let year = value / 100;
        let month = value % 100;
        if !(1..=9999).contains(&year) || !(1..=12).contains(&month) {
            return Err(MonthError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    /// The current month in UTC.
    pub fn current() -> Self {
        let now = Utc::now();
        Self(now.year() as u32 * 100 + now.month())
    }

    pub fn year(self) -> u32 {
        self.0 / 100
    }

    pub fn month(self) -> u32 {
        self.0 % 100
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Shift by a whole number of months. Saturates at the representable range.
    pub fn offset(self, months: i32) -> Self {
        let index = self.year() as i64 * 12 + (self.month() as i64 - 1) + months as i64;
        let index = index.clamp(12, 9999 * 12 + 11);
        let year = (index / 12) as u32;
        let month = (index % 12) as u32 + 1;
        Self(year * 100 + month)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl FromStr for Month {
    type Err = MonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MonthError::Format(s.to_string()));
        }
        let value: u32 = s.parse().map_err(|_| MonthError::Format(s.to_string()))?;
        Self::from_yyyymm(value)
    }
}

impl TryFrom<u32> for Month {
    type Error = MonthError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_yyyymm(value)
    }
}

impl From<Month> for u32 {
    fn from(month: Month) -> u32 {
        month.0
    }
}
