//! Generation horizon: the half-open window [start, end) every
//! generated fact must fall into, plus the calendar helpers shared
//! by the generators.

use crate::types::Timestamp;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Horizon {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Horizon {
    pub fn new(start_date: NaiveDate, days: u32) -> Self {
        let start = start_date.and_time(NaiveTime::MIN);
        Self {
            start,
            end: start + Duration::days(i64::from(days)),
        }
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }

    /// Last calendar date inside the horizon.
    pub fn last_date(&self) -> NaiveDate {
        (self.end - Duration::microseconds(1)).date()
    }

    pub fn contains(&self, ts: &Timestamp) -> bool {
        *ts >= self.start && *ts < self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Next Saturday strictly after `date` (or the Sunday if `date` is a Saturday).
pub fn next_weekend_day(date: NaiveDate) -> NaiveDate {
    let ahead = match date.weekday() {
        Weekday::Sat => 1,
        Weekday::Sun => 6,
        other => 5 - i64::from(other.num_days_from_monday()),
    };
    date + Duration::days(ahead)
}

/// Advance `date` by `n` business days.
pub fn add_business_days(date: NaiveDate, n: u32) -> NaiveDate {
    let mut d = date;
    let mut added = 0;
    while added < n {
        d += Duration::days(1);
        if is_business_day(d) {
            added += 1;
        }
    }
    d
}
