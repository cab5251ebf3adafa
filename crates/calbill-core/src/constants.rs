/// Billing constants shared across crates
pub const INVOICE_START_NUMBER: u32 = 1001;

/// Item label used when a customer group has no explicit item set.
pub const DEFAULT_ITEM: &str = "Tutoring";

/// Half-width of the default conversion window, in days before/after today.
pub const DEFAULT_RANGE_DAYS: u64 = 365;

/// Upper bound on candidates generated by the fallback recurrence evaluator.
pub const FALLBACK_GENERATION_CAP: u64 = 500_000;

/// Row count past which an export is considered large and worth a warning.
pub const LARGE_EXPORT_ROW_THRESHOLD: usize = 50_000;
