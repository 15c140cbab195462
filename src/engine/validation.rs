//! Admission rules for stays and availability windows.
//!
//! Rules run in a fixed order and the first failure wins:
//! 1. dates present and parseable
//! 2. departure after arrival
//! 3. arrival strictly after today
//! 4. stay no longer than [`MAX_STAY_NIGHTS`] (stays only)
//! 5. both dates within [`BOOKING_HORIZON_MONTHS`] of today

use chrono::{Days, Months, NaiveDate};

use crate::limits::*;
use crate::model::DateInterval;

use super::error::{EngineError, RangeViolation};

/// Exactly `YYYY-MM-DD`: four-digit year, zero-padded month and day, no sign
/// and no surrounding whitespace.
fn is_iso_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Parse an optional `YYYY-MM-DD` string. Absent and blank both mean "not given".
pub fn parse_date(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, EngineError> {
    let Some(s) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    let malformed = || EngineError::MalformedInput(format!("{field}: expected YYYY-MM-DD, got {s:?}"));
    if !is_iso_date(s) {
        return Err(malformed());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| malformed())
}

fn require_date(field: &str, raw: Option<&str>) -> Result<NaiveDate, EngineError> {
    parse_date(field, raw)?.ok_or_else(|| EngineError::MalformedInput(format!("{field} is required")))
}

fn earliest_arrival(today: NaiveDate) -> NaiveDate {
    today.checked_add_days(Days::new(MIN_LEAD_DAYS)).unwrap_or(NaiveDate::MAX)
}

/// Last date a stay or window may touch.
pub fn booking_horizon(today: NaiveDate) -> NaiveDate {
    today
        .checked_add_months(Months::new(BOOKING_HORIZON_MONTHS))
        .unwrap_or(NaiveDate::MAX)
}

fn check_order(arrival: NaiveDate, departure: NaiveDate) -> Result<(), RangeViolation> {
    if arrival < departure {
        Ok(())
    } else {
        Err(RangeViolation::DepartureNotAfterArrival { arrival, departure })
    }
}

fn check_lead_time(arrival: NaiveDate, today: NaiveDate) -> Result<(), RangeViolation> {
    if today < arrival {
        Ok(())
    } else {
        Err(RangeViolation::InsufficientLeadTime {
            arrival,
            earliest: earliest_arrival(today),
        })
    }
}

fn check_horizon(date: NaiveDate, today: NaiveDate) -> Result<(), RangeViolation> {
    let horizon = booking_horizon(today);
    if date <= horizon {
        Ok(())
    } else {
        Err(RangeViolation::BeyondHorizon { date, horizon })
    }
}

/// Full rule chain for creating or rescheduling a stay.
pub fn validate_stay(
    arrival: NaiveDate,
    departure: NaiveDate,
    today: NaiveDate,
) -> Result<DateInterval, RangeViolation> {
    check_order(arrival, departure)?;
    check_lead_time(arrival, today)?;
    let nights = (departure - arrival).num_days();
    if nights > MAX_STAY_NIGHTS {
        return Err(RangeViolation::StayTooLong {
            nights,
            max_nights: MAX_STAY_NIGHTS,
        });
    }
    check_horizon(arrival, today)?;
    check_horizon(departure, today)?;
    Ok(DateInterval::new(arrival, departure))
}

/// Parse and validate the raw dates of a stay request.
pub fn parse_stay(
    arrival: Option<&str>,
    departure: Option<&str>,
    today: NaiveDate,
) -> Result<DateInterval, EngineError> {
    let arrival = require_date("arrival", arrival)?;
    let departure = require_date("departure", departure)?;
    Ok(validate_stay(arrival, departure, today)?)
}

/// Inclusive day window for an availability query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl QueryWindow {
    pub fn as_interval(&self) -> DateInterval {
        DateInterval::window(self.first, self.last)
    }
}

/// Availability window rules: stay-length is not applied, and a date that
/// was filled in by default skips the lead-time and horizon checks.
///
/// Missing arrival defaults to tomorrow; missing departure defaults to one
/// month after arrival, less a day.
pub fn validate_window(
    arrival: Option<NaiveDate>,
    departure: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<QueryWindow, RangeViolation> {
    let first = arrival.unwrap_or_else(|| earliest_arrival(today));
    let last = departure.unwrap_or_else(|| {
        first
            .checked_add_months(Months::new(BOOKING_HORIZON_MONTHS))
            .and_then(|d| d.pred_opt())
            .unwrap_or(first)
    });

    check_order(first, last)?;
    if arrival.is_some() {
        check_lead_time(first, today)?;
        check_horizon(first, today)?;
    }
    if departure.is_some() {
        check_horizon(last, today)?;
    }
    Ok(QueryWindow { first, last })
}

/// Parse and validate the raw dates of an availability query.
pub fn parse_window(
    arrival: Option<&str>,
    departure: Option<&str>,
    today: NaiveDate,
) -> Result<QueryWindow, EngineError> {
    let arrival = parse_date("arrival", arrival)?;
    let departure = parse_date("departure", departure)?;
    Ok(validate_window(arrival, departure, today)?)
}
