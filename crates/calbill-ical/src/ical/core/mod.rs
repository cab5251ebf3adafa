//! iCalendar core models.
//!
//! These types carry exactly what downstream billing needs from a VEVENT:
//! identity, free text, temporal anchors, and recurrence modifiers. Unknown
//! properties are dropped during parsing rather than preserved.

mod datetime;
mod event;
mod property;

pub use datetime::{
    datetime_key_local, datetime_key_utc, day_key, format_date_only, local_datetime,
};
pub use event::{DateEntry, Event, EventDate};
pub use property::{ContentLine, Parameter};
