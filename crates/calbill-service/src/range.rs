//! Conversion window resolution.

use calbill_core::constants::DEFAULT_RANGE_DAYS;
use calbill_ical::ical::core::{format_date_only, local_datetime};
use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime};

use crate::error::{ServiceError, ServiceResult};

/// The effective `[start, end]` window one conversion runs against.
///
/// Invariant: `start <= end`; [`resolve_range`] refuses to construct an
/// inverted window.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    /// True when neither bound was supplied and the safety window applies.
    pub is_default: bool,
    pub label_from: String,
    pub label_to: String,
}

impl Range {
    /// Returns whether an instant falls inside the window (inclusive).
    #[must_use]
    pub fn contains(&self, dt: &DateTime<Local>) -> bool {
        *dt >= self.start && *dt <= self.end
    }

    /// Human-readable window description.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} to {}", self.label_from, self.label_to)
    }
}

/// Computes the effective window from optional from/to dates.
///
/// With both absent the default window is `[today - 365d, today + 365d]` at
/// local day boundaries. A supplied `from` starts at 00:00:00, a supplied
/// `to` ends at 23:59:59.
///
/// ## Errors
/// Returns [`ServiceError::InvalidRange`] when both bounds are supplied and
/// `from > to`.
pub fn resolve_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> ServiceResult<Range> {
    let today = Local::now().date_naive();
    let default_from = today
        .checked_sub_days(Days::new(DEFAULT_RANGE_DAYS))
        .unwrap_or(today);
    let default_to = today
        .checked_add_days(Days::new(DEFAULT_RANGE_DAYS))
        .unwrap_or(today);

    if from.is_none() && to.is_none() {
        let start = start_of_day(default_from);
        let end = end_of_day(default_to);
        return Ok(Range {
            label_from: format_date_only(&start),
            label_to: format_date_only(&end),
            start,
            end,
            is_default: true,
        });
    }

    if let (Some(from), Some(to)) = (from, to)
        && from > to
    {
        return Err(ServiceError::InvalidRange(
            "Date range start is after date range end.".to_string(),
        ));
    }

    let start = from.map_or_else(|| start_of_day(default_from), start_of_day);
    let end = to.map_or_else(
        || end_of_day(default_to),
        |d| local_datetime(d.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default())),
    );

    Ok(Range {
        label_from: format_date_only(&start),
        label_to: format_date_only(&end),
        start,
        end,
        is_default: false,
    })
}

fn start_of_day(date: NaiveDate) -> DateTime<Local> {
    local_datetime(date.and_time(NaiveTime::MIN))
}

fn end_of_day(date: NaiveDate) -> DateTime<Local> {
    local_datetime(
        date.and_time(NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or_default()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn default_window_spans_a_year_each_way() {
        let range = resolve_range(None, None).unwrap();
        assert!(range.is_default);

        let today = Local::now().date_naive();
        let expected_from = today.checked_sub_days(Days::new(365)).unwrap();
        let expected_to = today.checked_add_days(Days::new(365)).unwrap();
        assert_eq!(range.label_from, expected_from.format("%Y-%m-%d").to_string());
        assert_eq!(range.label_to, expected_to.format("%Y-%m-%d").to_string());
        assert_eq!(range.start.time().hour(), 0);
        assert_eq!(range.end.time().hour(), 23);
    }

    #[test]
    fn explicit_bounds_use_day_edges() {
        let range = resolve_range(Some(date(2024, 1, 1)), Some(date(2024, 3, 31))).unwrap();
        assert!(!range.is_default);
        assert_eq!(range.label(), "2024-01-01 to 2024-03-31");
        assert_eq!(range.start.time(), NaiveTime::MIN);
        assert_eq!(
            range.end.time(),
            NaiveTime::from_hms_opt(23, 59, 59).unwrap()
        );
    }

    #[test]
    fn single_bound_falls_back_to_default_for_the_other() {
        let range = resolve_range(Some(date(2024, 1, 1)), None).unwrap();
        assert!(!range.is_default);
        assert_eq!(range.label_from, "2024-01-01");
        assert!(range.start <= range.end);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = resolve_range(Some(date(2024, 3, 1)), Some(date(2024, 1, 1))).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRange(_)));
    }

    #[test]
    fn equal_bounds_are_a_one_day_window() {
        let range = resolve_range(Some(date(2024, 2, 1)), Some(date(2024, 2, 1))).unwrap();
        assert!(range.start < range.end);
    }

    #[test]
    fn contains_is_inclusive() {
        let range = resolve_range(Some(date(2024, 1, 1)), Some(date(2024, 1, 2))).unwrap();
        assert!(range.contains(&range.start));
        assert!(range.contains(&range.end));
        assert!(!range.contains(&shifted(&range.end)));
    }

    fn shifted(dt: &DateTime<Local>) -> DateTime<Local> {
        *dt + chrono::TimeDelta::seconds(1)
    }
}
