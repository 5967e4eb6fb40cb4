//! Time windows over stored requests

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};

use crate::error::QueryError;

/// Half-open `[start, end)` range of request times. A missing bound is
/// unconstrained, so `TimeWindow::all()` matches every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Midnight UTC at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

impl TimeWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Everything at or after `instant`.
    pub fn since(instant: DateTime<Utc>) -> Self {
        Self {
            start: Some(instant),
            end: None,
        }
    }

    /// Everything strictly before `instant`.
    pub fn before(instant: DateTime<Utc>) -> Self {
        Self {
            start: None,
            end: Some(instant),
        }
    }

    pub fn day(date: NaiveDate) -> Self {
        let next = date + Days::new(1);
        Self::between(start_of_day(date), start_of_day(next))
    }

    pub fn day_of(year: i32, month: u32, day: u32) -> Result<Self, QueryError> {
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| QueryError::InvalidDate(format!("{year:04}-{month:02}-{day:02}")))?;
        Ok(Self::day(date))
    }

    /// The calendar month containing `date`.
    pub fn month(date: NaiveDate) -> Self {
        let first = date.with_day(1).unwrap_or(date);
        let next = first + Months::new(1);
        Self::between(start_of_day(first), start_of_day(next))
    }

    pub fn month_of(year: i32, month: u32) -> Result<Self, QueryError> {
        let date = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| QueryError::InvalidDate(format!("{year:04}-{month:02}")))?;
        Ok(Self::month(date))
    }

    /// Week `week` of `year`, numbered like `strftime("%U")`: weeks start
    /// on Sunday and week 1 begins on the first Sunday of the year.
    pub fn week(year: i32, week: u32) -> Result<Self, QueryError> {
        if week > 53 {
            return Err(QueryError::InvalidWeek { year, week });
        }
        let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| QueryError::InvalidDate(format!("{year:04}-01-01")))?;
        let to_sunday = (7 - jan1.weekday().num_days_from_sunday()) % 7;
        let first_sunday = jan1 + Days::new(to_sunday as u64);

        let start = if week == 0 {
            first_sunday.checked_sub_days(Days::new(7))
        } else {
            first_sunday.checked_add_days(Days::new(7 * (week as u64 - 1)))
        }
        .ok_or(QueryError::InvalidWeek { year, week })?;

        Ok(Self::between(
            start_of_day(start),
            start_of_day(start + Days::new(7)),
        ))
    }

    pub fn year(year: i32) -> Result<Self, QueryError> {
        let first = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| QueryError::InvalidDate(format!("{year:04}")))?;
        let next = NaiveDate::from_ymd_opt(year + 1, 1, 1)
            .ok_or_else(|| QueryError::InvalidDate(format!("{:04}", year + 1)))?;
        Ok(Self::between(start_of_day(first), start_of_day(next)))
    }

    /// The Sunday-based week containing `date`.
    pub fn week_containing(date: NaiveDate) -> Self {
        let start = date - Days::new(date.weekday().num_days_from_sunday() as u64);
        Self::between(start_of_day(start), start_of_day(start + Days::new(7)))
    }

    pub fn today() -> Self {
        Self::day(Utc::now().date_naive())
    }

    pub fn this_week() -> Self {
        Self::week_containing(Utc::now().date_naive())
    }

    pub fn this_month() -> Self {
        Self::month(Utc::now().date_naive())
    }

    pub fn this_year() -> Result<Self, QueryError> {
        Self::year(Utc::now().year())
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start.map(|start| time >= start).unwrap_or(true)
            && self.end.map(|end| time < end).unwrap_or(true)
    }
}
