//! VEVENT block scanning and event assembly.
//!
//! Parsing is partial-failure tolerant: one malformed event never loses the
//! rest of the calendar. Only a structural failure to tokenize the document
//! lands in [`ParseOutcome::errors`].

use super::lexer::{parse_content_line, unfold_lines};
use super::values::{
    parse_date_entries, parse_duration_ms, parse_ics_date, parse_token_key, unescape_text,
};
use crate::error::{IcalError, IcalResult};
use crate::ical::core::{DateEntry, Event, datetime_key_local};

/// Result of parsing one ICS document.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// One entry per VEVENT block, in document order. Invalid events are
    /// included (flagged) so downstream can warn about them.
    pub events: Vec<Event>,
    pub warnings: Vec<String>,
    /// Non-empty only when the document structure could not be tokenized;
    /// no events are produced in that case.
    pub errors: Vec<String>,
}

/// Parses an ICS document into events plus accumulated warnings/errors.
#[tracing::instrument(skip(text), fields(input_len = text.len()))]
pub fn parse_ics(text: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let lines = unfold_lines(text);
    tracing::debug!(count = lines.len(), "Unfolded logical lines");

    match scan_event_blocks(&lines) {
        Ok(blocks) => {
            for block in &blocks {
                outcome.events.push(build_event(block));
            }
            if outcome.events.is_empty() {
                outcome
                    .warnings
                    .push("No VEVENT entries found in the file.".to_string());
            }
            tracing::debug!(events = outcome.events.len(), "Parsed VEVENT blocks");
        }
        Err(err) => {
            tracing::warn!(error = %err, "Failed to tokenize ICS document");
            outcome.errors.push(err.to_string());
        }
    }

    outcome
}

/// Collects the property lines of each VEVENT block.
///
/// Lines outside `BEGIN:VEVENT`/`END:VEVENT` are ignored, as are empty
/// blocks and an unterminated block at end of input. A `BEGIN:VEVENT`
/// inside an open block makes the document untokenizable.
fn scan_event_blocks(lines: &[(usize, String)]) -> IcalResult<Vec<Vec<(usize, String)>>> {
    let mut blocks = Vec::new();
    let mut current: Vec<(usize, String)> = Vec::new();
    let mut in_event = false;

    for (line_num, line) in lines {
        match line.as_str() {
            "BEGIN:VEVENT" => {
                if in_event {
                    return Err(IcalError::Structure {
                        line: *line_num,
                        message: "BEGIN:VEVENT inside an open VEVENT block".to_string(),
                    });
                }
                in_event = true;
                current.clear();
            }
            "END:VEVENT" => {
                in_event = false;
                if !current.is_empty() {
                    blocks.push(std::mem::take(&mut current));
                }
            }
            _ => {
                if in_event {
                    current.push((*line_num, line.clone()));
                }
            }
        }
    }

    Ok(blocks)
}

/// Assembles one VEVENT block's property lines into an [`Event`].
///
/// Single-valued properties are last-write-wins; EXDATE/RDATE accumulate.
/// Unknown property names are ignored.
fn build_event(lines: &[(usize, String)]) -> Event {
    let mut event = Event::default();

    for (_, line) in lines {
        let Some(cl) = parse_content_line(line) else {
            continue;
        };
        let value = unescape_text(&cl.raw_value);

        match cl.name.as_str() {
            "UID" => {
                event.uid_canonical = normalize_uid(&value);
                event.uid = value;
            }
            "SUMMARY" => event.summary = value,
            "DESCRIPTION" => event.description = value,
            "LOCATION" => event.location = value,
            "DTSTART" => {
                event.start = parse_ics_date(&value, &cl.params);
                event.all_day = event.start.as_ref().is_some_and(|s| s.all_day);
            }
            "DTEND" => event.end = parse_ics_date(&value, &cl.params),
            "DURATION" => event.duration_ms = Some(parse_duration_ms(&value)),
            "RRULE" => event.rrule = value.trim().to_string(),
            "RDATE" => parse_date_entries(&value, &cl.params, &mut event.additional_dates),
            "EXDATE" => parse_date_entries(&value, &cl.params, &mut event.exception_dates),
            "RECURRENCE-ID" => {
                event.recurrence_override = parse_ics_date(&value, &cl.params).map(|parsed| {
                    let key = parse_token_key(&value)
                        .unwrap_or_else(|| datetime_key_local(&parsed.instant));
                    DateEntry {
                        instant: parsed.instant,
                        day_key: key[..8].to_string(),
                        key,
                    }
                });
            }
            "STATUS" => event.status = value.trim().to_ascii_uppercase(),
            _ => {}
        }
    }

    if event.summary.is_empty() {
        event.summary = "Untitled Event".to_string();
    }

    if event.start.is_none() {
        event.invalid_reason = Some("Missing DTSTART");
        return event;
    }

    resolve_duration(&mut event);
    event
}

/// Applies duration resolution once all properties are read.
///
/// 1. Neither DTEND nor DURATION: zero.
/// 2. DTEND without DURATION on a timed event: `max(0, end - start)`.
/// 3. All-day DTSTART and DTEND: day-granularity span, overriding DURATION.
/// 4. Otherwise the parsed DURATION stands.
fn resolve_duration(event: &mut Event) {
    let Some(start) = &event.start else {
        return;
    };

    if event.end.is_none() && event.duration_ms.is_none() {
        event.duration_ms = Some(0);
    }

    if let Some(end) = &event.end {
        let span = (end.instant - start.instant).num_milliseconds().max(0);
        if event.duration_ms.is_none() && !event.all_day {
            event.duration_ms = Some(span);
        }
        if end.all_day && start.all_day {
            event.duration_ms = Some(span);
        }
    }
}

/// Strips a trailing recurrence-instance suffix (`_R<8digits>T<6digits>[Z]`,
/// optionally followed by `@...`) to recover the canonical master UID.
#[must_use]
pub fn normalize_uid(uid: &str) -> String {
    let trimmed = uid.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    // The suffix can legitimately appear before an "@host" tail, so try
    // every "_R" position from the right, like a backtracking match would.
    let mut search_end = trimmed.len();
    while let Some(idx) = trimmed[..search_end].rfind("_R") {
        if let Some(stripped) = strip_instance_suffix(trimmed, idx) {
            return stripped;
        }
        search_end = idx;
    }

    trimmed.to_string()
}

fn strip_instance_suffix(uid: &str, idx: usize) -> Option<String> {
    let after = &uid[idx + 2..];
    let (token, rest) = after.split_at_checked(15)?;

    let token_bytes = token.as_bytes();
    let digits_ok = token_bytes[..8].iter().all(u8::is_ascii_digit)
        && token_bytes[8] == b'T'
        && token_bytes[9..].iter().all(u8::is_ascii_digit);
    if !digits_ok {
        return None;
    }

    let rest = rest.strip_prefix('Z').unwrap_or(rest);
    if rest.is_empty() || rest.starts_with('@') {
        Some(format!("{}{rest}", &uid[..idx]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ical::core::datetime_key_local;

    const SIMPLE_VEVENT: &str = "\
BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Test//Test//EN\r\n\
BEGIN:VEVENT\r\n\
UID:test-uid-123@example.com\r\n\
DTSTAMP:20240110T120000Z\r\n\
DTSTART:20240115T090000\r\n\
DTEND:20240115T103000\r\n\
SUMMARY:Test Event\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test_log::test]
    fn parse_simple_vevent() {
        let outcome = parse_ics(SIMPLE_VEVENT);
        assert!(outcome.errors.is_empty());
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.events.len(), 1);

        let event = &outcome.events[0];
        assert_eq!(event.uid, "test-uid-123@example.com");
        assert_eq!(event.summary, "Test Event");
        assert_eq!(event.duration_ms, Some(90 * 60 * 1000));
        assert!(!event.is_invalid());
        assert!(!event.is_cancelled());
    }

    #[test]
    fn parse_duration_property() {
        let input = "\
BEGIN:VEVENT\n\
UID:dur@example.com\n\
DTSTART:20240115T090000\n\
DURATION:PT1H30M\n\
SUMMARY:Session\n\
END:VEVENT\n";
        let outcome = parse_ics(input);
        assert_eq!(outcome.events[0].duration_ms, Some(5_400_000));
    }

    #[test]
    fn all_day_span_is_day_granular() {
        let input = "\
BEGIN:VEVENT\n\
UID:allday@example.com\n\
DTSTART;VALUE=DATE:20240101\n\
DTEND;VALUE=DATE:20240103\n\
SUMMARY:Retreat\n\
END:VEVENT\n";
        let outcome = parse_ics(input);
        let event = &outcome.events[0];
        assert!(event.all_day);
        assert_eq!(event.duration_ms, Some(172_800_000));
    }

    #[test]
    fn missing_end_and_duration_is_zero() {
        let input = "\
BEGIN:VEVENT\n\
UID:zero@example.com\n\
DTSTART:20240115T090000\n\
SUMMARY:Ping\n\
END:VEVENT\n";
        let outcome = parse_ics(input);
        assert_eq!(outcome.events[0].duration_ms, Some(0));
    }

    #[test]
    fn missing_dtstart_is_invalid_not_fatal() {
        let input = "\
BEGIN:VEVENT\n\
UID:broken@example.com\n\
SUMMARY:No Start\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
UID:fine@example.com\n\
DTSTART:20240115T090000\n\
SUMMARY:Fine\n\
END:VEVENT\n";
        let outcome = parse_ics(input);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.events.len(), 2);
        assert!(outcome.events[0].is_invalid());
        assert_eq!(outcome.events[0].invalid_reason, Some("Missing DTSTART"));
        assert!(!outcome.events[1].is_invalid());
    }

    #[test]
    fn blank_summary_defaults() {
        let input = "\
BEGIN:VEVENT\n\
UID:nosummary@example.com\n\
DTSTART:20240115T090000\n\
END:VEVENT\n";
        let outcome = parse_ics(input);
        assert_eq!(outcome.events[0].summary, "Untitled Event");
    }

    #[test]
    fn last_write_wins_for_single_valued_properties() {
        let input = "\
BEGIN:VEVENT\n\
UID:first@example.com\n\
UID:second@example.com\n\
DTSTART:20240115T090000\n\
SUMMARY:One\n\
SUMMARY:Two\n\
END:VEVENT\n";
        let outcome = parse_ics(input);
        assert_eq!(outcome.events[0].uid, "second@example.com");
        assert_eq!(outcome.events[0].summary, "Two");
    }

    #[test]
    fn exdate_and_rdate_accumulate() {
        let input = "\
BEGIN:VEVENT\n\
UID:acc@example.com\n\
DTSTART:20240101T100000\n\
RRULE:FREQ=DAILY;COUNT=10\n\
EXDATE:20240102T100000,20240103T100000\n\
EXDATE:20240104T100000\n\
RDATE:20240201T100000\n\
SUMMARY:Series\n\
END:VEVENT\n";
        let outcome = parse_ics(input);
        let event = &outcome.events[0];
        assert_eq!(event.exception_dates.len(), 3);
        assert_eq!(event.additional_dates.len(), 1);
        assert_eq!(event.exception_dates[1].day_key, "20240103");
    }

    #[test]
    fn recurrence_id_captures_override_keys() {
        let input = "\
BEGIN:VEVENT\n\
UID:abc_R20240305T100000@example.com\n\
DTSTART:20240305T140000\n\
RECURRENCE-ID:20240305T100000\n\
SUMMARY:Moved\n\
END:VEVENT\n";
        let outcome = parse_ics(input);
        let event = &outcome.events[0];
        assert_eq!(event.uid_canonical, "abc@example.com");
        let entry = event.recurrence_override.as_ref().unwrap();
        assert_eq!(entry.key, "20240305T100000");
        assert_eq!(entry.day_key, "20240305");
        assert_eq!(datetime_key_local(&entry.instant), "20240305T100000");
    }

    #[test]
    fn status_is_normalized_uppercase() {
        let input = "\
BEGIN:VEVENT\n\
UID:status@example.com\n\
DTSTART:20240115T090000\n\
STATUS: cancelled \n\
SUMMARY:Gone\n\
END:VEVENT\n";
        let outcome = parse_ics(input);
        assert!(outcome.events[0].is_cancelled());
    }

    #[test]
    fn escaped_text_is_unescaped() {
        let input = "\
BEGIN:VEVENT\n\
UID:escape@example.com\n\
DTSTART:20240115T090000\n\
SUMMARY:Meeting\\, important\n\
DESCRIPTION:Line 1\\nLine 2\n\
END:VEVENT\n";
        let outcome = parse_ics(input);
        assert_eq!(outcome.events[0].summary, "Meeting, important");
        assert_eq!(outcome.events[0].description, "Line 1\nLine 2");
    }

    #[test]
    fn folded_summary_joins() {
        let input = "\
BEGIN:VEVENT\r\n\
UID:folded@example.com\r\n\
DTSTART:20240115T090000\r\n\
SUMMARY:Long client na\r\n me here\r\n\
END:VEVENT\r\n";
        let outcome = parse_ics(input);
        assert_eq!(outcome.events[0].summary, "Long client name here");
    }

    #[test]
    fn no_vevent_warns() {
        let outcome = parse_ics("BEGIN:VCALENDAR\nVERSION:2.0\nEND:VCALENDAR\n");
        assert!(outcome.events.is_empty());
        assert_eq!(
            outcome.warnings,
            vec!["No VEVENT entries found in the file.".to_string()]
        );
    }

    #[test]
    fn nested_begin_is_a_hard_error() {
        let input = "\
BEGIN:VEVENT\n\
UID:outer@example.com\n\
BEGIN:VEVENT\n\
UID:inner@example.com\n\
END:VEVENT\n";
        let outcome = parse_ics(input);
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("line 3"));
    }

    #[test]
    fn empty_block_produces_no_event() {
        let outcome = parse_ics("BEGIN:VEVENT\nEND:VEVENT\n");
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn unterminated_block_is_dropped() {
        let input = "\
BEGIN:VEVENT\n\
UID:open@example.com\n\
DTSTART:20240115T090000\n";
        let outcome = parse_ics(input);
        assert!(outcome.events.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn normalize_uid_strips_instance_suffix() {
        assert_eq!(
            normalize_uid("abc_R20240305T100000Z@google.com"),
            "abc@google.com"
        );
        assert_eq!(normalize_uid("abc_R20240305T100000"), "abc");
        assert_eq!(normalize_uid("plain@example.com"), "plain@example.com");
        assert_eq!(normalize_uid("  padded  "), "padded");
    }

    #[test]
    fn normalize_uid_ignores_malformed_suffixes() {
        assert_eq!(normalize_uid("abc_R2024T100000"), "abc_R2024T100000");
        assert_eq!(
            normalize_uid("abc_R20240305T100000junk"),
            "abc_R20240305T100000junk"
        );
    }

    #[test]
    fn normalize_uid_backtracks_past_later_underscores() {
        assert_eq!(
            normalize_uid("x_R20240305T100000@y_Rz"),
            "x@y_Rz"
        );
    }
}
