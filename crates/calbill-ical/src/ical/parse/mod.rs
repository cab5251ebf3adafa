//! ICS parsing: line unfolding, content-line tokenization, value codecs,
//! and VEVENT assembly.

pub mod lexer;
pub mod parser;
pub mod values;

pub use lexer::{parse_content_line, unfold_lines};
pub use parser::{ParseOutcome, normalize_uid, parse_ics};
