//! Wall-clock stepping in the local zone.
//!
//! All stepping operates on the naive local fields and re-resolves through
//! [`local_datetime`], so a step across a DST transition keeps the
//! wall-clock time of day rather than the absolute offset.

use calbill_ical::ical::core::local_datetime;
use chrono::{DateTime, Datelike, Days, Local, NaiveDate};

/// Shifts an instant by whole days, preserving its local time of day.
pub(crate) fn shift_days(dt: &DateTime<Local>, days: i64) -> DateTime<Local> {
    let naive = dt.naive_local();
    let date = naive.date();
    let shifted = if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    match shifted {
        Some(d) => local_datetime(d.and_time(naive.time())),
        None => *dt,
    }
}

/// Steps forward by months, clamping the day-of-month to the target month's
/// length (Jan 31 + 1 month lands on Feb 28/29).
pub(crate) fn add_months_clamped(dt: &DateTime<Local>, months: i64) -> DateTime<Local> {
    let naive = dt.naive_local();
    let date = naive.date();

    let total = i64::from(date.year()) * 12 + i64::from(date.month0()) + months;
    let year = total.div_euclid(12);
    let month0 = total.rem_euclid(12);
    let Ok(year) = i32::try_from(year) else {
        return *dt;
    };
    let month = u32::try_from(month0).unwrap_or(0) + 1;

    let day = date.day().min(days_in_month(year, month));
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(d) => local_datetime(d.and_time(naive.time())),
        None => *dt,
    }
}

/// Steps forward by years, keeping the month and clamping the day (guards
/// Feb 29 on non-leap years).
pub(crate) fn add_years_clamped(dt: &DateTime<Local>, years: i64) -> DateTime<Local> {
    let naive = dt.naive_local();
    let date = naive.date();

    let Ok(year) = i32::try_from(i64::from(date.year()) + years) else {
        return *dt;
    };
    let day = date.day().min(days_in_month(year, date.month()));
    match NaiveDate::from_ymd_opt(year, date.month(), day) {
        Some(d) => local_datetime(d.and_time(naive.time())),
        None => *dt,
    }
}

/// Returns the Sunday of `dt`'s week, carrying `dt`'s time of day.
pub(crate) fn week_anchor(dt: &DateTime<Local>) -> DateTime<Local> {
    let back = i64::from(dt.weekday().num_days_from_sunday());
    shift_days(dt, -back)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    for day in (28..=31).rev() {
        if NaiveDate::from_ymd_opt(year, month, day).is_some() {
            return day;
        }
    }
    28
}
