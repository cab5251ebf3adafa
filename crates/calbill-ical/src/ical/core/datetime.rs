//! Local-instant construction and calendar-key formatting.
//!
//! Occurrence instants are `DateTime<Local>`: values with a trailing `Z` are
//! parsed as UTC and viewed locally, values without are constructed as local
//! wall-clock time. Calendar keys (`YYYYMMDDTHHMMSS`) exist in both local and
//! UTC renderings so exclusion matching tolerates either interpretation of
//! the source value.

use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeDelta, TimeZone, Utc};

/// Resolves a wall-clock datetime in the local zone.
///
/// DST folds resolve to the first occurrence; a datetime inside a DST gap is
/// shifted forward one hour before resolving.
#[must_use]
pub fn local_datetime(naive: NaiveDateTime) -> DateTime<Local> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
        LocalResult::None => Local
            .from_local_datetime(&(naive + TimeDelta::hours(1)))
            .earliest()
            .unwrap_or_else(|| Local.from_utc_datetime(&naive)),
    }
}

/// Formats an instant as a second-precision calendar key from its local fields.
#[must_use]
pub fn datetime_key_local(dt: &DateTime<Local>) -> String {
    dt.format("%Y%m%dT%H%M%S").to_string()
}

/// Formats an instant as a second-precision calendar key from its UTC fields.
#[must_use]
pub fn datetime_key_utc(dt: &DateTime<Local>) -> String {
    dt.with_timezone(&Utc).format("%Y%m%dT%H%M%S").to_string()
}

/// Returns the date-only prefix of a calendar key.
#[must_use]
pub fn day_key(key: &str) -> &str {
    key.get(..8).unwrap_or(key)
}

/// Formats an instant as `YYYY-MM-DD` in local time.
#[must_use]
pub fn format_date_only(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn local_key_reflects_wall_clock_fields() {
        let dt = local_datetime(naive(2024, 3, 5, 10, 0, 0));
        assert_eq!(datetime_key_local(&dt), "20240305T100000");
    }

    #[test]
    fn day_key_is_date_prefix() {
        assert_eq!(day_key("20240305T100000"), "20240305");
        assert_eq!(day_key("short"), "short");
    }

    #[test]
    fn date_only_uses_local_fields() {
        let dt = local_datetime(naive(2024, 12, 31, 23, 0, 0));
        assert_eq!(format_date_only(&dt), "2024-12-31");
    }

    #[test]
    fn utc_key_matches_local_key_for_utc_constructed_instants() {
        let utc = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let dt = utc.with_timezone(&Local);
        assert_eq!(datetime_key_utc(&dt), "20240305T100000");
    }
}
