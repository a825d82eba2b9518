//! Human-readable order numbers.
//!
//! Format: `{PREFIX}{YYMMDD}{4-digit sequence}`, e.g. `ORD2412010008` —
//! unique per store per day. The sequence restarts at 0001 each day and
//! each store keeps its own sequence; uniqueness is ultimately enforced by
//! the store's unique key, this module only computes candidates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use storekeep_core::{DomainError, DomainResult};

/// Prefix carried by every order number.
pub const ORDER_NUMBER_PREFIX: &str = "ORD";

/// Highest sequence a single store can issue in one day.
pub const MAX_DAILY_SEQUENCE: u32 = 9999;

/// Date-based prefix shared by all of a day's numbers (`ORD241201`).
pub fn day_prefix(date: NaiveDate) -> String {
    format!("{ORDER_NUMBER_PREFIX}{}", date.format("%y%m%d"))
}

/// A validated order number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// The first number a store issues on `date` (`...0001`).
    pub fn first_of_day(date: NaiveDate) -> Self {
        Self(format!("{}0001", day_prefix(date)))
    }

    /// Build from a date and an explicit sequence.
    pub fn from_parts(date: NaiveDate, sequence: u32) -> DomainResult<Self> {
        if sequence == 0 || sequence > MAX_DAILY_SEQUENCE {
            return Err(DomainError::validation(format!(
                "order number sequence must be 1..={MAX_DAILY_SEQUENCE}, got {sequence}",
            )));
        }
        Ok(Self(format!("{}{sequence:04}", day_prefix(date))))
    }

    /// Parse and validate a stored order number.
    pub fn parse(s: &str) -> DomainResult<Self> {
        let rest = s.strip_prefix(ORDER_NUMBER_PREFIX).ok_or_else(|| {
            DomainError::validation(format!("order number must start with {ORDER_NUMBER_PREFIX}"))
        })?;
        if rest.len() != 10 || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(
                "order number must be a 6-digit date and a 4-digit sequence",
            ));
        }
        let (date_part, sequence_part) = rest.split_at(6);
        NaiveDate::parse_from_str(date_part, "%y%m%d")
            .map_err(|e| DomainError::validation(format!("order number date: {e}")))?;
        let sequence: u32 = sequence_part
            .parse()
            .map_err(|e| DomainError::validation(format!("order number sequence: {e}")))?;
        if sequence == 0 {
            return Err(DomainError::validation("order number sequence cannot be 0000"));
        }
        Ok(Self(s.to_string()))
    }

    /// The trailing 4-digit counter.
    pub fn sequence(&self) -> u32 {
        self.0[self.0.len() - 4..].parse().unwrap_or(0)
    }

    /// The date encoded in the number.
    pub fn date(&self) -> NaiveDate {
        let date_part = &self.0[ORDER_NUMBER_PREFIX.len()..ORDER_NUMBER_PREFIX.len() + 6];
        // Infallible for a value constructed through parse/from_parts.
        NaiveDate::parse_from_str(date_part, "%y%m%d").expect("validated order number date")
    }

    /// The next number in the same day's sequence.
    pub fn next(&self) -> DomainResult<Self> {
        let next_sequence = self.sequence() + 1;
        if next_sequence > MAX_DAILY_SEQUENCE {
            return Err(DomainError::validation(format!(
                "order number sequence exhausted for {}",
                day_prefix(self.date()),
            )));
        }
        OrderNumber::from_parts(self.date(), next_sequence)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for OrderNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
