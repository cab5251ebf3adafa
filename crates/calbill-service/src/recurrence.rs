//! Recurrence expansion: the injected evaluator, the built-in fallback
//! mini-evaluator, and exclusion/override filtering.
//!
//! Expansion of one event proceeds in layers: the full evaluator (when
//! injected and successful), otherwise the fallback; RDATE instants join
//! either result; overrides and EXDATEs then suppress instants via five-way
//! key matching; finally the set is range-filtered, deduplicated, and
//! sorted.

use std::collections::{HashMap, HashSet};

use calbill_core::constants::FALLBACK_GENERATION_CAP;
use calbill_ical::ical::core::{
    DateEntry, Event, datetime_key_local, datetime_key_utc, day_key, local_datetime,
};
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Utc};
use rrule::RRuleSet;

use crate::error::{ServiceError, ServiceResult};
use crate::localtime::{add_months_clamped, add_years_clamped, shift_days, week_anchor};
use crate::range::Range;

/// Capability boundary for full RRULE evaluation.
///
/// Implementations take a textual rule plus the series start and produce all
/// occurrences within `[start, end]`, inclusive of both ends. Failure is
/// non-fatal to callers: a warning is recorded and the fallback evaluator
/// runs instead.
pub trait RecurrenceEvaluator {
    /// ## Errors
    /// Returns an error when the rule cannot be parsed or evaluated.
    fn expand_between(
        &self,
        rule: &str,
        dtstart: DateTime<Local>,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> ServiceResult<Vec<DateTime<Local>>>;
}

/// Evaluator backed by the `rrule` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RruleEvaluator;

impl RecurrenceEvaluator for RruleEvaluator {
    fn expand_between(
        &self,
        rule: &str,
        dtstart: DateTime<Local>,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> ServiceResult<Vec<DateTime<Local>>> {
        // A naive DTSTART makes the rrule crate evaluate in local time,
        // matching how local instants were constructed during parsing.
        let source = format!(
            "DTSTART:{}\nRRULE:{}",
            dtstart.format("%Y%m%dT%H%M%S"),
            rule
        );
        let rrule_set = source
            .parse::<RRuleSet>()
            .map_err(|e| ServiceError::Evaluator(e.to_string()))?;

        // `after` is exclusive; pull it back one second so an occurrence
        // exactly on the window start is kept.
        let inclusive_start = start - chrono::TimeDelta::seconds(1);
        let result = rrule_set
            .after(inclusive_start.with_timezone(&rrule::Tz::LOCAL))
            .before(end.with_timezone(&rrule::Tz::LOCAL))
            .all(u16::MAX);
        if result.limited {
            tracing::warn!(rule, limit = u16::MAX, "Recurrence expansion truncated");
        }

        Ok(result
            .dates
            .into_iter()
            .map(|dt| dt.with_timezone(&Local))
            .collect())
    }
}

/// Instant sets keyed three ways for zone-tolerant suppression.
///
/// An instant matches when any of these hold, checked in order: exact
/// millisecond equality, local calendar-key, UTC calendar-key, local
/// day-key, UTC day-key.
#[derive(Debug, Default)]
struct KeyedSet {
    instants: HashSet<i64>,
    keys: HashSet<String>,
    day_keys: HashSet<String>,
}

impl KeyedSet {
    fn from_entries(entries: &[DateEntry]) -> Self {
        let mut set = Self::default();
        for entry in entries {
            set.instants.insert(entry.instant.timestamp_millis());
            if !entry.key.is_empty() {
                set.keys.insert(entry.key.clone());
            }
            if !entry.day_key.is_empty() {
                set.day_keys.insert(entry.day_key.clone());
            }
        }
        set
    }

    fn matches(&self, dt: &DateTime<Local>) -> bool {
        if self.instants.contains(&dt.timestamp_millis()) {
            return true;
        }
        let local_key = datetime_key_local(dt);
        if self.keys.contains(&local_key) {
            return true;
        }
        let utc_key = datetime_key_utc(dt);
        if self.keys.contains(&utc_key) {
            return true;
        }
        self.day_keys.contains(day_key(&local_key)) || self.day_keys.contains(day_key(&utc_key))
    }
}

/// Indexes override events (those carrying a RECURRENCE-ID) by the
/// canonical UID of the series they modify.
#[must_use]
pub fn build_override_index(events: &[Event]) -> HashMap<String, Vec<DateEntry>> {
    let mut index: HashMap<String, Vec<DateEntry>> = HashMap::new();
    for event in events {
        let Some(entry) = &event.recurrence_override else {
            continue;
        };
        if event.uid_canonical.is_empty() {
            continue;
        }
        index
            .entry(event.uid_canonical.clone())
            .or_default()
            .push(entry.clone());
    }
    index
}

/// Expands one event into its in-range occurrence instants, sorted and
/// deduplicated. Warnings (evaluator failures, fallback use) are appended
/// to the shared sink.
pub fn expand_event(
    event: &Event,
    range: &Range,
    overrides: Option<&[DateEntry]>,
    evaluator: Option<&dyn RecurrenceEvaluator>,
    warnings: &mut Vec<String>,
) -> Vec<DateTime<Local>> {
    let Some(start) = &event.start else {
        return Vec::new();
    };

    let exclusions = KeyedSet::from_entries(&event.exception_dates);

    if event.rrule.is_empty() {
        let mut candidates = vec![start.instant];
        candidates.extend(event.additional_dates.iter().map(|d| d.instant));
        return finalize(candidates, range, &exclusions, None);
    }

    let mut occurrences = Vec::new();
    if let Some(evaluator) = evaluator {
        match evaluator.expand_between(&event.rrule, start.instant, range.start, range.end) {
            Ok(dates) => occurrences = dates,
            Err(err) => warnings.push(format!(
                "Error expanding recurrence for \"{}\": {err}",
                event.summary
            )),
        }
    }

    if occurrences.is_empty() {
        occurrences = expand_with_fallback(&event.rrule, start.instant, range);
        if !occurrences.is_empty() {
            warnings.push(format!(
                "Fallback recurrence expansion used for: {}",
                event.summary
            ));
        }
    }

    occurrences.extend(event.additional_dates.iter().map(|d| d.instant));

    let override_set = overrides.map(KeyedSet::from_entries);
    finalize(occurrences, range, &exclusions, override_set.as_ref())
}

fn finalize(
    candidates: Vec<DateTime<Local>>,
    range: &Range,
    exclusions: &KeyedSet,
    overrides: Option<&KeyedSet>,
) -> Vec<DateTime<Local>> {
    let mut occurrences = dedupe_and_sort(candidates);
    occurrences.retain(|dt| {
        overrides.is_none_or(|set| !set.matches(dt))
            && !exclusions.matches(dt)
            && range.contains(dt)
    });
    occurrences
}

fn dedupe_and_sort(candidates: Vec<DateTime<Local>>) -> Vec<DateTime<Local>> {
    let mut seen = HashSet::new();
    let mut out: Vec<DateTime<Local>> = candidates
        .into_iter()
        .filter(|dt| seen.insert(dt.timestamp_millis()))
        .collect();
    out.sort_unstable_by_key(DateTime::timestamp_millis);
    out
}

/// Minimal RRULE evaluation used when the injected evaluator is absent,
/// fails, or produces nothing.
///
/// Supports FREQ (DAILY/WEEKLY/MONTHLY/YEARLY), INTERVAL, COUNT, UNTIL,
/// and BYDAY (WEEKLY only). COUNT counts every candidate generated from
/// DTSTART, including those before the visible window; generation stops at
/// the window end, UNTIL, or the candidate cap, whichever comes first.
fn expand_with_fallback(
    rule: &str,
    dtstart: DateTime<Local>,
    range: &Range,
) -> Vec<DateTime<Local>> {
    let Some(parts) = parse_simple_rrule(rule) else {
        return Vec::new();
    };

    let interval = parts
        .get("INTERVAL")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(1)
        .max(1);
    let count = match parts.get("COUNT") {
        Some(v) => match v.parse::<u64>() {
            Ok(n) => n,
            Err(_) => return Vec::new(),
        },
        None => u64::MAX,
    };
    let until = parts.get("UNTIL").and_then(|v| parse_until(v));
    let range_end = match until {
        Some(u) if u < range.end => u,
        _ => range.end,
    };
    let limit = count.min(FALLBACK_GENERATION_CAP);

    match parts.get("FREQ").map(String::as_str) {
        Some("DAILY") => step_series(dtstart, range, range_end, limit, |cur| {
            shift_days(cur, interval)
        }),
        Some("WEEKLY") => {
            let weekdays: Vec<u32> = parts
                .get("BYDAY")
                .map(|v| v.split(',').filter_map(weekday_index).collect())
                .unwrap_or_default();
            if weekdays.is_empty() {
                step_series(dtstart, range, range_end, limit, |cur| {
                    shift_days(cur, 7 * interval)
                })
            } else {
                weekly_byday(dtstart, range, range_end, limit, interval, &weekdays)
            }
        }
        Some("MONTHLY") => step_series(dtstart, range, range_end, limit, |cur| {
            add_months_clamped(cur, interval)
        }),
        Some("YEARLY") => step_series(dtstart, range, range_end, limit, |cur| {
            add_years_clamped(cur, interval)
        }),
        _ => Vec::new(),
    }
}

/// Walks a single stepped series from DTSTART, counting every candidate and
/// keeping those inside the visible window.
fn step_series(
    dtstart: DateTime<Local>,
    range: &Range,
    range_end: DateTime<Local>,
    limit: u64,
    step: impl Fn(&DateTime<Local>) -> DateTime<Local>,
) -> Vec<DateTime<Local>> {
    let mut occurrences = Vec::new();
    let mut current = dtstart;
    let mut generated = 0u64;

    while current <= range_end && generated < limit {
        generated += 1;
        if current >= range.start && current <= range_end {
            occurrences.push(current);
        }
        let next = step(&current);
        if next <= current {
            // A step that fails to advance would spin until the cap.
            break;
        }
        current = next;
    }

    occurrences
}

/// WEEKLY expansion with a BYDAY list.
///
/// Weeks advance from the Sunday of DTSTART's week by `interval`; each week
/// emits one candidate per listed weekday at DTSTART's time of day. A
/// candidate earlier in the starting week than DTSTART itself is skipped
/// entirely; it never counts toward COUNT.
fn weekly_byday(
    dtstart: DateTime<Local>,
    range: &Range,
    range_end: DateTime<Local>,
    limit: u64,
    interval: i64,
    weekdays: &[u32],
) -> Vec<DateTime<Local>> {
    let mut occurrences = Vec::new();
    let mut week_start = week_anchor(&dtstart);
    let mut generated = 0u64;

    'weeks: while week_start <= range_end && generated < limit {
        for &weekday in weekdays {
            let delta = i64::from(
                (weekday + 7 - week_start.weekday().num_days_from_sunday()) % 7,
            );
            let candidate = shift_days(&week_start, delta);

            if candidate < dtstart || candidate > range_end {
                continue;
            }

            generated += 1;
            if candidate >= range.start && candidate <= range.end {
                occurrences.push(candidate);
            }

            if generated >= limit {
                break 'weeks;
            }
        }
        week_start = shift_days(&week_start, 7 * interval);
    }

    occurrences
}

/// Splits rule text into uppercase `KEY -> value` parts. Returns `None`
/// unless the text looks like a recurrence rule and names a FREQ.
fn parse_simple_rrule(rule: &str) -> Option<HashMap<String, String>> {
    let trimmed = rule.trim();
    if !trimmed.starts_with("RRULE:") && !trimmed.contains("FREQ=") {
        return None;
    }

    let normalized = trimmed.strip_prefix("RRULE:").unwrap_or(trimmed);
    let mut parts = HashMap::new();
    for part in normalized.split(';') {
        if let Some((key, value)) = part.split_once('=') {
            parts.insert(key.to_ascii_uppercase(), value.to_string());
        }
    }

    if parts.contains_key("FREQ") { Some(parts) } else { None }
}

/// Parses an UNTIL bound: UTC (`...Z`), naive date-time, or a bare date
/// taken as local end of day.
fn parse_until(value: &str) -> Option<DateTime<Local>> {
    let trimmed = value.trim();

    if let Some(body) = trimmed.strip_suffix('Z')
        && let Ok(naive) = chrono::NaiveDateTime::parse_from_str(body, "%Y%m%dT%H%M%S")
    {
        return Some(Utc.from_utc_datetime(&naive).with_timezone(&Local));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H%M%S") {
        return Some(local_datetime(naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y%m%d") {
        return Some(local_datetime(date.and_hms_opt(23, 59, 59)?));
    }
    None
}

fn weekday_index(token: &str) -> Option<u32> {
    match token.trim() {
        "SU" => Some(0),
        "MO" => Some(1),
        "TU" => Some(2),
        "WE" => Some(3),
        "TH" => Some(4),
        "FR" => Some(5),
        "SA" => Some(6),
        _ => None,
    }
}
