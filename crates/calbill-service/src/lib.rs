//! Occurrence expansion and invoice aggregation over parsed calendar events.
//!
//! Everything here is synchronous and free of I/O: the only external
//! capability is the injected [`recurrence::RecurrenceEvaluator`], a
//! fallible synchronous call whose failure is non-fatal (the built-in
//! fallback evaluator takes over).

pub mod error;
pub mod export;
pub mod invoice;
mod localtime;
pub mod range;
pub mod recurrence;
