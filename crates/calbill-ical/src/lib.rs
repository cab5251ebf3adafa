//! iCalendar (RFC 5545) interpretation for calendar-feed billing.
//!
//! This crate turns raw ICS text into structured [`ical::core::Event`]
//! records: line unfolding, content-line tokenization, value codecs, and
//! VEVENT assembly. It performs no I/O and resolves no timezone database;
//! TZID parameters are carried as opaque labels.

pub mod error;
pub mod ical;
