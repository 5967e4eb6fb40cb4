//! Age units for purging old requests

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    /// 30 days
    Months,
    /// 365 days
    Years,
}

impl PurgeUnit {
    pub const ALL: [PurgeUnit; 6] = [
        PurgeUnit::Minutes,
        PurgeUnit::Hours,
        PurgeUnit::Days,
        PurgeUnit::Weeks,
        PurgeUnit::Months,
        PurgeUnit::Years,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PurgeUnit::Minutes => "minutes",
            PurgeUnit::Hours => "hours",
            PurgeUnit::Days => "days",
            PurgeUnit::Weeks => "weeks",
            PurgeUnit::Months => "months",
            PurgeUnit::Years => "years",
        }
    }

    /// Length of `amount` units, `None` on overflow.
    pub fn span(self, amount: u32) -> Option<Duration> {
        let amount = i64::from(amount);
        match self {
            PurgeUnit::Minutes => Duration::try_minutes(amount),
            PurgeUnit::Hours => Duration::try_hours(amount),
            PurgeUnit::Days => Duration::try_days(amount),
            PurgeUnit::Weeks => Duration::try_weeks(amount),
            PurgeUnit::Months => Duration::try_days(amount.checked_mul(30)?),
            PurgeUnit::Years => Duration::try_days(amount.checked_mul(365)?),
        }
    }

    /// Requests logged before the returned instant are older than
    /// `amount` units.
    pub fn cutoff(self, amount: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.span(amount)?)
    }
}

impl fmt::Display for PurgeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts singular or plural, case-insensitive.
impl FromStr for PurgeUnit {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let plural = if lower.ends_with('s') {
            lower
        } else {
            format!("{}s", lower)
        };

        PurgeUnit::ALL
            .into_iter()
            .find(|unit| unit.as_str() == plural)
            .ok_or_else(|| ConfigurationError::InvalidSetting {
                key: "duration".to_string(),
                value: s.to_string(),
            })
    }
}
