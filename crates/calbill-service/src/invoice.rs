//! Invoice aggregation: expanded occurrences grouped per customer.
//!
//! Customer groups are keyed by event summary (case-sensitive) and kept in
//! first-seen order. Groups and rows are rebuilt from scratch on every
//! conversion; after a conversion returns, the caller owns them and may
//! edit rate/item/dates/selection before export.

use std::collections::HashMap;

use calbill_ical::ical::core::{Event, format_date_only};
use calbill_ical::ical::parse::ParseOutcome;
use chrono::{Local, NaiveDate};

use crate::error::{ServiceError, ServiceResult};
use crate::export::Terms;
use crate::range::resolve_range;
use crate::recurrence::{RecurrenceEvaluator, build_override_index, expand_event};

/// One expanded occurrence, ready for review and export.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Occurrence calendar day (`YYYY-MM-DD`, local).
    pub date: String,
    /// Occurrence instant in epoch milliseconds; rows sort by this.
    pub sort_key: i64,
    pub description: String,
    /// Event duration in hours, rounded to two decimals.
    pub duration_hours: f64,
    pub selected: bool,
}

/// All rows for one customer, plus the editable invoice fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerGroup {
    pub name: String,
    pub enabled: bool,
    pub item: String,
    pub rate: f64,
    pub invoice_date: NaiveDate,
    pub terms: Terms,
    pub rows: Vec<Row>,
}

/// Inputs to one conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Seeded into new groups; must be a finite number >= 0.
    pub hourly_rate: f64,
    /// Seeded into new groups.
    pub default_item: String,
}

impl ConvertOptions {
    fn validate(&self) -> ServiceResult<()> {
        if !self.hourly_rate.is_finite() || self.hourly_rate < 0.0 {
            return Err(ServiceError::InvalidOptions(
                "hourly rate must be a finite number >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of one conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    /// Groups in first-seen order, rows sorted ascending by occurrence.
    pub customer_groups: Vec<CustomerGroup>,
    pub expanded_rows: usize,
    pub warnings: Vec<String>,
    pub range_label: String,
}

/// Expands every billable event against the resolved range and aggregates
/// occurrences into per-customer invoice rows.
///
/// Cancelled and invalid events are skipped (invalid ones with a warning);
/// events whose expansion is empty create no group. Per-event defects never
/// abort the run.
///
/// ## Errors
/// Returns an error for an inverted date range or invalid options; no
/// partial result is produced in that case.
#[tracing::instrument(skip_all, fields(events = parsed.events.len()))]
pub fn convert_events_to_lines(
    parsed: &ParseOutcome,
    options: &ConvertOptions,
    evaluator: Option<&dyn RecurrenceEvaluator>,
) -> ServiceResult<Conversion> {
    options.validate()?;

    let mut warnings = parsed.warnings.clone();
    let range = resolve_range(options.date_from, options.date_to)?;
    if range.is_default {
        warnings.push(
            "No date range was provided; temporary local safety range is set to 365 days \
             before/after today."
                .to_string(),
        );
    }

    let override_index = build_override_index(&parsed.events);
    let today = Local::now().date_naive();

    let mut groups: Vec<CustomerGroup> = Vec::new();
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut no_duration_customers: Vec<String> = Vec::new();
    let mut expanded_rows = 0usize;

    for event in &parsed.events {
        if event.is_cancelled() {
            tracing::debug!(uid = %event.uid, "Skipping cancelled event");
            continue;
        }
        if let Some(reason) = event.invalid_reason {
            tracing::debug!(uid = %event.uid, reason, "Skipping invalid event");
            warnings.push(format!(
                "Skipping event missing DTSTART: {}.",
                event.display_name()
            ));
            continue;
        }

        let overrides = override_index
            .get(&event.uid_canonical)
            .map(Vec::as_slice);
        let occurrences = expand_event(event, &range, overrides, evaluator, &mut warnings);
        if occurrences.is_empty() {
            continue;
        }

        let group_pos = match group_index.get(&event.summary) {
            Some(&pos) => pos,
            None => {
                groups.push(CustomerGroup {
                    name: event.summary.clone(),
                    enabled: true,
                    item: options.default_item.clone(),
                    rate: options.hourly_rate,
                    invoice_date: today,
                    terms: Terms::default(),
                    rows: Vec::new(),
                });
                group_index.insert(event.summary.clone(), groups.len() - 1);
                groups.len() - 1
            }
        };

        if event.duration_ms.unwrap_or(0) == 0 && !no_duration_customers.contains(&event.summary)
        {
            no_duration_customers.push(event.summary.clone());
        }

        let description = row_description(event);
        let duration_hours = round2(duration_ms_to_hours(event.duration_ms.unwrap_or(0)));
        for occurrence in occurrences {
            groups[group_pos].rows.push(Row {
                date: format_date_only(&occurrence),
                sort_key: occurrence.timestamp_millis(),
                description: description.clone(),
                duration_hours,
                selected: true,
            });
            expanded_rows += 1;
        }
    }

    for name in &no_duration_customers {
        warnings.push(format!(
            "One or more events for customer \"{name}\" has no duration. Amount defaults to \
             0.00 unless edited with a manual rate override."
        ));
    }

    for group in &mut groups {
        group.rows.sort_by_key(|row| row.sort_key);
    }

    tracing::debug!(
        customers = groups.len(),
        rows = expanded_rows,
        "Aggregated invoice rows"
    );

    Ok(Conversion {
        customer_groups: groups,
        expanded_rows,
        warnings,
        range_label: range.label(),
    })
}

/// Rounds to two decimals, half away from zero; non-finite input becomes 0.
/// Applied identically to hours and money.
#[must_use]
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).round() / 100.0
}

#[expect(clippy::cast_precision_loss, reason = "durations stay far below 2^52 ms")]
fn duration_ms_to_hours(ms: i64) -> f64 {
    ms as f64 / 3_600_000.0
}

/// Row description: event description with whitespace runs collapsed, or a
/// placeholder when blank.
fn row_description(event: &Event) -> String {
    let description = event.description.trim();
    if description.is_empty() {
        "(no details)".to_string()
    } else {
        description.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
