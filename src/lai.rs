//! Deadline arithmetic for access-to-information (LAI) requests.

use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Business days an agency has to answer a request.
pub const RESPONSE_BUSINESS_DAYS: u32 = 20;

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Advance `date` by `n` business days. Each step moves to the next weekday,
/// so a weekend start rolls to Monday on the first step.
pub fn add_business_days(date: NaiveDate, n: u32) -> NaiveDate {
    let mut current = date;
    for _ in 0..n {
        current = next_business_day(current);
    }
    current
}

fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut next = date.succ_opt().unwrap_or(date);
    while !is_business_day(next) {
        next = next + Days::new(1);
    }
    next
}

/// Statutory response deadline for a request submitted on `submitted_on`.
pub fn response_deadline(submitted_on: NaiveDate) -> NaiveDate {
    add_business_days(submitted_on, RESPONSE_BUSINESS_DAYS)
}
