//! Parsed VEVENT model.

use chrono::{DateTime, Local};

/// A parsed DATE or DATE-TIME value with its zone interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDate {
    /// The resolved instant.
    pub instant: DateTime<Local>,
    /// True for 8-digit dates and `VALUE=DATE` values (local midnight).
    pub all_day: bool,
    /// `"UTC"` for Z-suffixed values, the TZID parameter otherwise, or empty.
    /// Carried as an opaque label; never resolved against zone rules.
    pub zone_label: String,
}

/// One EXDATE/RDATE/RECURRENCE-ID entry with tolerant matching keys.
///
/// `key` is taken from the raw ICS token when it has calendar-key shape, so
/// matching works regardless of the zone interpretation used to resolve
/// `instant`.
#[derive(Debug, Clone, PartialEq)]
pub struct DateEntry {
    pub instant: DateTime<Local>,
    /// Second-precision calendar key (`YYYYMMDDTHHMMSS`).
    pub key: String,
    /// Date-only prefix of `key`.
    pub day_key: String,
}

/// One VEVENT's parsed content.
///
/// Immutable once built; expansion and aggregation read but never modify it.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub uid: String,
    /// `uid` with any recurrence-instance suffix stripped, used to correlate
    /// an overriding event to its master series.
    pub uid_canonical: String,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start: Option<EventDate>,
    pub end: Option<EventDate>,
    /// Resolved duration in milliseconds; `None` until resolution runs.
    pub duration_ms: Option<i64>,
    /// Raw recurrence rule text (everything after `RRULE:`), or empty.
    pub rrule: String,
    /// RDATE values: additional occurrence instants beyond the rule's set.
    pub additional_dates: Vec<DateEntry>,
    /// EXDATE values: instants excluded from the expansion.
    pub exception_dates: Vec<DateEntry>,
    /// RECURRENCE-ID: which master-series occurrence this event replaces.
    pub recurrence_override: Option<DateEntry>,
    /// Normalized uppercase STATUS; `CANCELLED` events are never expanded.
    pub status: String,
    /// Set when the event cannot be billed (missing DTSTART).
    pub invalid_reason: Option<&'static str>,
    /// Mirrors `start.all_day`.
    pub all_day: bool,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            uid: String::new(),
            uid_canonical: String::new(),
            summary: String::new(),
            description: String::new(),
            location: String::new(),
            start: None,
            end: None,
            duration_ms: None,
            rrule: String::new(),
            additional_dates: Vec::new(),
            exception_dates: Vec::new(),
            recurrence_override: None,
            status: "CONFIRMED".to_string(),
            invalid_reason: None,
            all_day: false,
        }
    }
}

impl Event {
    /// Returns whether this event must be skipped instead of expanded.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.invalid_reason.is_some()
    }

    /// Returns whether this event was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status == "CANCELLED"
    }

    /// Name used when reporting this event in warnings.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if !self.summary.is_empty() {
            &self.summary
        } else if !self.uid.is_empty() {
            &self.uid
        } else {
            "Unknown"
        }
    }
}
