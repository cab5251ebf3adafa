//! `calbill` binary: expand an ICS calendar feed into invoice line-item CSVs.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use calbill_core::config::load_config;
use calbill_core::constants::LARGE_EXPORT_ROW_THRESHOLD;
use calbill_ical::ical::parse::parse_ics;
use calbill_service::export::{ExportLine, build_csv, build_export_lines, sanitize_file_name};
use calbill_service::invoice::{ConvertOptions, convert_events_to_lines};
use calbill_service::recurrence::RruleEvaluator;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    /// One CSV holding every enabled customer's rows.
    Combined,
    /// One CSV per enabled customer.
    PerCustomer,
}

#[derive(Debug, Parser)]
#[command(name = "calbill", about = "Convert an ICS calendar feed into invoice line items")]
struct Cli {
    /// Path to the .ics file to convert.
    input: PathBuf,

    /// Start of the conversion window (YYYY-MM-DD).
    #[arg(long)]
    date_from: Option<NaiveDate>,

    /// End of the conversion window (YYYY-MM-DD).
    #[arg(long)]
    date_to: Option<NaiveDate>,

    /// Hourly rate seeded into every customer group.
    #[arg(long)]
    rate: Option<f64>,

    /// Item label seeded into every customer group.
    #[arg(long)]
    item: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputMode::Combined)]
    output_mode: OutputMode,

    /// Directory CSV files are written into.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();

    let settings = load_config()?;
    if let Ok(filter) = EnvFilter::try_new(settings.logging.level.as_str()) {
        if let Err(e) = filter_handle.modify(|current| *current = filter) {
            tracing::warn!(error = %e, "Failed to update log filter from config");
        }
    } else {
        tracing::warn!(level = %settings.logging.level, "Invalid log level in config, keeping info");
    }

    let text = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;

    let parsed = parse_ics(&text);
    if !parsed.errors.is_empty() {
        anyhow::bail!(
            "failed to parse {}: {}",
            cli.input.display(),
            parsed.errors.join("; ")
        );
    }

    let options = ConvertOptions {
        date_from: cli.date_from,
        date_to: cli.date_to,
        hourly_rate: cli.rate.unwrap_or(settings.billing.hourly_rate),
        default_item: cli
            .item
            .clone()
            .unwrap_or_else(|| settings.billing.default_item.clone()),
    };

    let evaluator = RruleEvaluator;
    let conversion = convert_events_to_lines(&parsed, &options, Some(&evaluator))?;

    for warning in &conversion.warnings {
        tracing::warn!("{warning}");
    }
    tracing::info!(
        rows = conversion.expanded_rows,
        customers = conversion.customer_groups.len(),
        range = %conversion.range_label,
        "Conversion complete"
    );

    let lines = build_export_lines(&conversion.customer_groups);
    if lines.is_empty() {
        tracing::info!("No enabled customer/event rows to export.");
        return Ok(());
    }
    if lines.len() > LARGE_EXPORT_ROW_THRESHOLD {
        tracing::warn!(
            rows = lines.len(),
            threshold = LARGE_EXPORT_ROW_THRESHOLD,
            "Export exceeds the large-export threshold"
        );
    }

    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating {}", cli.out_dir.display()))?;

    match cli.output_mode {
        OutputMode::Combined => {
            let path = cli.out_dir.join("qbo-invoice-export.csv");
            fs::write(&path, build_csv(&lines))
                .with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), rows = lines.len(), "Prepared combined CSV");
        }
        OutputMode::PerCustomer => {
            let mut order: Vec<String> = Vec::new();
            let mut by_customer: HashMap<String, Vec<ExportLine>> = HashMap::new();
            for line in lines {
                if !by_customer.contains_key(&line.customer) {
                    order.push(line.customer.clone());
                }
                by_customer.entry(line.customer.clone()).or_default().push(line);
            }

            for name in &order {
                let customer_lines = &by_customer[name];
                let path = cli
                    .out_dir
                    .join(format!("qbo-invoice-{}.csv", sanitize_file_name(name)));
                fs::write(&path, build_csv(customer_lines))
                    .with_context(|| format!("writing {}", path.display()))?;
                tracing::info!(
                    path = %path.display(),
                    rows = customer_lines.len(),
                    "Prepared customer CSV"
                );
            }
            tracing::info!(files = order.len(), "Prepared per-customer CSV files");
        }
    }

    Ok(())
}
