//! Export line construction and the CSV record contract.
//!
//! One line per selected occurrence of each enabled customer group.
//! Invoice numbers start at 1001 and increment once per enabled customer
//! with at least one selected row.

use calbill_core::constants::{DEFAULT_ITEM, INVOICE_START_NUMBER};
use chrono::{Days, NaiveDate};

use crate::invoice::{CustomerGroup, round2};

/// Payment terms for a customer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Terms {
    #[default]
    Net30,
    Net15,
}

impl Terms {
    /// Label used in the UI and the CSV output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Net30 => "Net 30",
            Self::Net15 => "Net 15",
        }
    }

    /// Days between invoice date and due date.
    #[must_use]
    pub const fn days(self) -> u64 {
        match self {
            Self::Net30 => 30,
            Self::Net15 => 15,
        }
    }

    /// Normalizes a label; anything other than `"Net 15"` is Net 30.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        if label == "Net 15" { Self::Net15 } else { Self::Net30 }
    }
}

impl std::fmt::Display for Terms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One CSV record.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportLine {
    pub invoice_no: u32,
    pub customer: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub terms: Terms,
    pub item: String,
    /// Hours, two-decimal rounded.
    pub item_qty: f64,
    pub item_rate: f64,
    pub item_amount: f64,
    /// The occurrence's calendar day (`YYYY-MM-DD`).
    pub service_date: String,
}

/// Flattens enabled groups' selected rows into export lines.
///
/// Rows are re-sorted by occurrence instant; a stored rate that is not a
/// finite number >= 0 exports as 0.
#[must_use]
pub fn build_export_lines(groups: &[CustomerGroup]) -> Vec<ExportLine> {
    let mut lines = Vec::new();
    let mut invoice_no = INVOICE_START_NUMBER;

    for group in groups {
        if !group.enabled {
            continue;
        }

        let mut rows: Vec<_> = group.rows.iter().filter(|row| row.selected).collect();
        rows.sort_by_key(|row| row.sort_key);
        if rows.is_empty() {
            continue;
        }

        let item = if group.item.is_empty() {
            DEFAULT_ITEM.to_string()
        } else {
            group.item.clone()
        };
        let rate = if group.rate.is_finite() && group.rate >= 0.0 {
            group.rate
        } else {
            0.0
        };
        let due = due_date(group.invoice_date, group.terms);

        for row in rows {
            lines.push(ExportLine {
                invoice_no,
                customer: group.name.clone(),
                invoice_date: group.invoice_date,
                due_date: due,
                terms: group.terms,
                item: item.clone(),
                item_qty: row.duration_hours,
                item_rate: round2(rate),
                item_amount: round2(row.duration_hours * rate),
                service_date: row.date.clone(),
            });
        }

        invoice_no += 1;
    }

    lines
}

/// Due date per terms: invoice date + 30 or 15 days.
#[must_use]
pub fn due_date(invoice_date: NaiveDate, terms: Terms) -> NaiveDate {
    invoice_date
        .checked_add_days(Days::new(terms.days()))
        .unwrap_or(invoice_date)
}

const CSV_HEADER: [&str; 10] = [
    "InvoiceNo",
    "Customer",
    "InvoiceDate",
    "DueDate",
    "Terms",
    "Item(Product/Service)",
    "ItemQty",
    "ItemRate",
    "ItemAmount",
    "ServiceDate",
];

/// Renders export lines as CSV text. Every cell is quote-wrapped with
/// internal double quotes doubled; amounts carry two decimals.
#[must_use]
pub fn build_csv(lines: &[ExportLine]) -> String {
    let mut rows = vec![CSV_HEADER.join(",")];

    for line in lines {
        rows.push(
            [
                csv_cell(&line.invoice_no.to_string()),
                csv_cell(&line.customer),
                csv_cell(&line.invoice_date.format("%Y-%m-%d").to_string()),
                csv_cell(&line.due_date.format("%Y-%m-%d").to_string()),
                csv_cell(line.terms.as_str()),
                csv_cell(&line.item),
                csv_cell(&format!("{:.2}", round2(line.item_qty))),
                csv_cell(&format!("{:.2}", round2(line.item_rate))),
                csv_cell(&format!("{:.2}", round2(line.item_amount))),
                csv_cell(&line.service_date),
            ]
            .join(","),
        );
    }

    rows.join("\n")
}

fn csv_cell(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Keeps `[A-Za-z0-9._-]`, replaces the rest with `-`, collapses runs.
#[must_use]
pub fn sanitize_file_name(value: &str) -> String {
    let trimmed = value.trim();
    let base = if trimmed.is_empty() { "customer" } else { trimmed };

    let replaced: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    for c in replaced.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }

    collapsed.trim_matches('-').to_string()
}
