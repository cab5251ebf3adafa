//! Content line lexer for iCalendar (RFC 5545 §3.1).
//!
//! Handles line unfolding and content-line splitting. Parsing here is
//! lenient: malformed lines degrade silently rather than failing the
//! document.

use crate::ical::core::{ContentLine, Parameter};

/// Splits raw ICS text into logical, unfolded lines.
///
/// Line endings are normalized (CRLF and lone CR become LF) before
/// splitting. A continuation line (one starting with SPACE or HTAB) has
/// its leading character stripped and is appended to the previous logical
/// line; a continuation with no predecessor is discarded. Blank lines are
/// dropped and trailing whitespace is trimmed from each logical line.
///
/// Each entry carries the 1-based number of its first physical line.
#[must_use]
pub fn unfold_lines(raw: &str) -> Vec<(usize, String)> {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<(usize, String)> = Vec::new();

    for (i, line) in normalized.split('\n').enumerate() {
        if let Some(continuation) = line.strip_prefix([' ', '\t']) {
            if let Some((_, prev)) = lines.last_mut() {
                prev.push_str(continuation);
            }
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        lines.push((i + 1, line.trim_end().to_string()));
    }

    for (_, line) in &mut lines {
        line.truncate(line.trim_end().len());
    }

    lines
}

/// Parses a single logical line into name, parameters, and raw value.
///
/// Only the first `:` splits name from value, so colons inside the value
/// (e.g. in a time) are preserved. The name segment splits on `;`: the
/// first token is the property name (uppercased), the rest are `KEY=VALUE`
/// parameter pairs with double-quoted values unquoted. Returns `None` when
/// the line has no `:` (the property is dropped).
#[must_use]
pub fn parse_content_line(line: &str) -> Option<ContentLine> {
    let (head, value) = line.split_once(':')?;

    let mut segments = head.split(';');
    let name = segments.next().unwrap_or_default().to_ascii_uppercase();

    let mut params = Vec::new();
    for segment in segments {
        if let Some((key, raw)) = segment.split_once('=') {
            params.push(Parameter::new(key, unquote_param(raw)));
        } else {
            params.push(Parameter::new(segment, ""));
        }
    }

    Some(ContentLine {
        name,
        params,
        raw_value: value.to_string(),
    })
}

fn unquote_param(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
