//! Value codecs for iCalendar properties (RFC 5545 §3.3).

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::ical::core::{DateEntry, EventDate, Parameter, datetime_key_local, local_datetime};

/// Unescapes TEXT values (RFC 5545 §3.3.11).
///
/// Escape sequences: `\\` `\;` `\,` `\n`/`\N` (newline) `\r`/`\R` (carriage
/// return). Invalid escapes are preserved as-is.
#[must_use]
pub fn unescape_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n' | 'N') => result.push('\n'),
                Some('r' | 'R') => result.push('\r'),
                Some(',') => result.push(','),
                Some(';') => result.push(';'),
                Some('\\') | None => result.push('\\'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
            }
        } else {
            result.push(c);
        }
    }

    result
}

fn param_value<'a>(params: &'a [Parameter], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.value.as_str())
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parses a DATE or DATE-TIME property value.
///
/// - `VALUE=DATE` parameter or a bare 8-digit value: all-day at local
///   midnight.
/// - `YYYYMMDDTHHMMSS[Z]`: with `Z` the value is a UTC instant (zone label
///   `"UTC"`); without, a local wall-clock instant (zone label = TZID
///   parameter if present).
/// - Anything else falls back to lenient ISO 8601 forms.
///
/// Returns `None` when the value is unparseable; the caller drops the
/// property.
#[must_use]
pub fn parse_ics_date(value: &str, params: &[Parameter]) -> Option<EventDate> {
    let normalized = value.trim();
    let zone_label = param_value(params, "TZID").unwrap_or_default().to_string();

    if param_value(params, "VALUE") == Some("DATE") || all_digits_len(normalized, 8) {
        let date = parse_yyyymmdd(normalized)?;
        return Some(EventDate {
            instant: local_datetime(date.and_hms_opt(0, 0, 0)?),
            all_day: true,
            zone_label,
        });
    }

    if let Some((naive, is_utc)) = parse_basic_datetime(normalized) {
        if is_utc {
            return Some(EventDate {
                instant: Utc.from_utc_datetime(&naive).with_timezone(&Local),
                all_day: false,
                zone_label: "UTC".to_string(),
            });
        }
        return Some(EventDate {
            instant: local_datetime(naive),
            all_day: false,
            zone_label,
        });
    }

    parse_lenient_datetime(normalized, zone_label)
}

fn all_digits_len(s: &str, len: usize) -> bool {
    s.len() == len && all_digits(s)
}

fn parse_yyyymmdd(s: &str) -> Option<NaiveDate> {
    if !all_digits_len(s, 8) {
        return None;
    }
    let year = s[0..4].parse().ok()?;
    let month = s[4..6].parse().ok()?;
    let day = s[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parses `YYYYMMDDTHHMMSS[Z]`, returning the wall-clock fields and whether
/// the value carried the UTC suffix.
fn parse_basic_datetime(s: &str) -> Option<(NaiveDateTime, bool)> {
    let (body, is_utc) = match s.strip_suffix('Z') {
        Some(stripped) => (stripped, true),
        None => (s, false),
    };

    if body.len() != 15 || body.as_bytes().get(8) != Some(&b'T') {
        return None;
    }

    let date = parse_yyyymmdd(&body[..8])?;
    let time = &body[9..];
    if !all_digits_len(time, 6) {
        return None;
    }
    let hour = time[0..2].parse().ok()?;
    let minute = time[2..4].parse().ok()?;
    let second = time[4..6].parse().ok()?;

    Some((date.and_hms_opt(hour, minute, second)?, is_utc))
}

/// Last-resort parsing for generic date strings.
fn parse_lenient_datetime(s: &str, zone_label: String) -> Option<EventDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(EventDate {
            instant: dt.with_timezone(&Local),
            all_day: false,
            zone_label,
        });
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(EventDate {
            instant: local_datetime(naive),
            all_day: false,
            zone_label,
        });
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(EventDate {
            instant: local_datetime(date.and_hms_opt(0, 0, 0)?),
            all_day: false,
            zone_label,
        });
    }
    None
}

/// Parses a DURATION value into milliseconds.
///
/// Grammar: `P[nD][T[nH][nM][nS]]`. Returns 0 when the value is empty or
/// does not start with `P`; missing components default to 0. The week
/// designator (`W`) is not handled and parses to 0.
#[must_use]
pub fn parse_duration_ms(value: &str) -> i64 {
    let Some(body) = value.strip_prefix('P') else {
        return 0;
    };

    let (date_part, time_part) = body.split_once('T').unwrap_or((body, ""));

    let days = duration_component(date_part, b'D');
    let hours = duration_component(time_part, b'H');
    let minutes = duration_component(time_part, b'M');
    let seconds = duration_component(time_part, b'S');

    (((days * 24 + hours) * 60 + minutes) * 60 + seconds) * 1000
}

/// Extracts the digits immediately preceding `designator`, or 0.
fn duration_component(part: &str, designator: u8) -> i64 {
    let bytes = part.as_bytes();
    let Some(pos) = bytes.iter().position(|&b| b == designator) else {
        return 0;
    };
    let mut start = pos;
    while start > 0 && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }
    part[start..pos].parse().unwrap_or(0)
}

/// Extracts a calendar key from a raw date-time token.
///
/// Accepts `YYYYMMDDT` followed by 4–6 time digits and an optional `Z`;
/// seconds default to `"00"`. Returns `None` for any other shape, in which
/// case the caller formats a key from the parsed instant instead.
#[must_use]
pub fn parse_token_key(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let body = trimmed.strip_suffix('Z').unwrap_or(trimmed);

    let (date, rest) = body.split_at_checked(8)?;
    let time = rest.strip_prefix('T')?;
    if !all_digits(date) || !(4..=6).contains(&time.len()) || !all_digits(time) {
        return None;
    }

    let hh = &time[0..2];
    let mm = &time[2..4];
    let ss = if time.len() >= 6 { &time[4..6] } else { "00" };
    Some(format!("{date}T{hh}{mm}{ss}"))
}

/// Parses a comma-separated EXDATE/RDATE value into `out`.
///
/// Unparseable entries are dropped. Each entry's matching key prefers the
/// raw token over a formatted key so that exclusion matching is independent
/// of the zone used to resolve the instant.
pub fn parse_date_entries(value: &str, params: &[Parameter], out: &mut Vec<DateEntry>) {
    for part in value.split(',') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Some(parsed) = parse_ics_date(trimmed, params) else {
            continue;
        };

        let key =
            parse_token_key(trimmed).unwrap_or_else(|| datetime_key_local(&parsed.instant));
        out.push(DateEntry {
            instant: parsed.instant,
            day_key: key[..8].to_string(),
            key,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ical::core::datetime_key_utc;

    #[test]
    fn unescape_basic() {
        assert_eq!(unescape_text("hello\\, world"), "hello, world");
        assert_eq!(unescape_text("a\\;b"), "a;b");
        assert_eq!(unescape_text("line1\\nline2"), "line1\nline2");
        assert_eq!(unescape_text("line1\\Nline2"), "line1\nline2");
        assert_eq!(unescape_text("back\\\\slash"), "back\\slash");
        assert_eq!(unescape_text("cr\\rend"), "cr\rend");
        assert_eq!(unescape_text("bad\\xescape"), "bad\\xescape");
    }

    #[test]
    fn parse_all_day_from_bare_date() {
        let parsed = parse_ics_date("20240101", &[]).unwrap();
        assert!(parsed.all_day);
        assert_eq!(datetime_key_local(&parsed.instant), "20240101T000000");
    }

    #[test]
    fn parse_all_day_from_value_date_param() {
        let params = vec![Parameter::new("VALUE", "DATE")];
        let parsed = parse_ics_date("20240103", &params).unwrap();
        assert!(parsed.all_day);
    }

    #[test]
    fn parse_local_datetime_keeps_wall_clock() {
        let parsed = parse_ics_date("20240115T090000", &[]).unwrap();
        assert!(!parsed.all_day);
        assert_eq!(parsed.zone_label, "");
        assert_eq!(datetime_key_local(&parsed.instant), "20240115T090000");
    }

    #[test]
    fn parse_utc_datetime_sets_zone_label() {
        let parsed = parse_ics_date("20240115T090000Z", &[]).unwrap();
        assert_eq!(parsed.zone_label, "UTC");
        assert_eq!(datetime_key_utc(&parsed.instant), "20240115T090000");
    }

    #[test]
    fn parse_carries_tzid_label_without_resolving() {
        let params = vec![Parameter::new("TZID", "America/New_York")];
        let parsed = parse_ics_date("20240115T090000", &params).unwrap();
        assert_eq!(parsed.zone_label, "America/New_York");
        // Wall clock is constructed locally; the label is informational only.
        assert_eq!(datetime_key_local(&parsed.instant), "20240115T090000");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_ics_date("not-a-date", &[]).is_none());
        assert!(parse_ics_date("2024011", &[]).is_none());
        assert!(parse_ics_date("20241301", &[]).is_none());
    }

    #[test]
    fn duration_hours_minutes() {
        assert_eq!(parse_duration_ms("PT1H30M"), 5_400_000);
    }

    #[test]
    fn duration_full_components() {
        assert_eq!(
            parse_duration_ms("P1DT2H30M15S"),
            ((24 + 2) * 3600 + 30 * 60 + 15) * 1000
        );
    }

    #[test]
    fn duration_empty_or_not_a_duration() {
        assert_eq!(parse_duration_ms(""), 0);
        assert_eq!(parse_duration_ms("1H"), 0);
    }

    #[test]
    fn duration_week_designator_is_unsupported() {
        // Known gap: the `W` designator parses to 0 rather than 7-day units.
        assert_eq!(parse_duration_ms("P2W"), 0);
    }

    #[test]
    fn token_key_normalizes_short_times() {
        assert_eq!(
            parse_token_key("20240305T100000Z").as_deref(),
            Some("20240305T100000")
        );
        assert_eq!(
            parse_token_key("20240305T1000").as_deref(),
            Some("20240305T100000")
        );
        assert_eq!(parse_token_key("20240305"), None);
        assert_eq!(parse_token_key("garbage"), None);
    }

    #[test]
    fn date_entries_split_on_commas_and_drop_garbage() {
        let mut out = Vec::new();
        parse_date_entries("20240101T100000, 20240102T100000,junk", &[], &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].key, "20240101T100000");
        assert_eq!(out[1].day_key, "20240102");
    }

    #[test]
    fn date_entries_prefer_raw_token_keys() {
        let mut out = Vec::new();
        parse_date_entries("20240305T100000Z", &[], &mut out);
        // The key reflects the token digits even though the instant was
        // resolved through UTC.
        assert_eq!(out[0].key, "20240305T100000");
        assert_eq!(out[0].day_key, "20240305");
    }
}
