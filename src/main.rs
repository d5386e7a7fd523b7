//! ruascope - DMARC RUA Mailbox Analyzer
//!
//! This tool ingests an MBOX archive of DMARC aggregate report mail, extracts
//! and parses the report attachments, classifies sending sources against a
//! provider-fingerprint dictionary, and prints aggregate statistics.
//!
//! The tool outputs results in one of three formats: Table, CSV, or JSON.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use colored::*;
use prettytable::{row, Table};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use ruascope::aggregate::DateWindow;
use ruascope::classifier::{ProviderDb, BUILTIN_DB};
use ruascope::config::Config;
use ruascope::diag::Severity;
use ruascope::pipeline::run_pipeline;

/// CLI arguments for ruascope.
#[derive(Parser, Debug)]
#[command(
    version,
    about = "DMARC RUA mailbox analyzer",
    long_about = "ruascope extracts DMARC aggregate reports from an MBOX archive, parses them, \
                  and prints pass/fail rates, top failing sources and provider attribution.\n\n\
                  USAGE:\n  ruascope <MBOX> [--begin YYYY-MM-DD --end YYYY-MM-DD] [--output <table|csv|json>]"
)]
struct Cli {
    /// Path to the MBOX mailbox archive
    #[arg(value_parser)]
    mbox: PathBuf,

    /// Only include reports overlapping this window start (YYYY-MM-DD, UTC)
    #[arg(long)]
    begin: Option<String>,

    /// Only include reports overlapping this window end (YYYY-MM-DD, UTC)
    #[arg(long)]
    end: Option<String>,

    /// Path to a JSON fingerprint dictionary (defaults to the built-in rules)
    #[arg(short, long)]
    fingerprints: Option<PathBuf>,

    /// Length of the top-N lists
    #[arg(short, long, default_value_t = 5)]
    top: usize,

    /// Output format: table, csv, json
    #[arg(short, long, default_value = "table")]
    output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Supported output formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

/// Parses a YYYY-MM-DD date into a UTC timestamp. `end_of_day` selects the
/// last second of the day so that --end is inclusive.
fn parse_day(s: &str, end_of_day: bool) -> Result<i64> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {} (expected YYYY-MM-DD)", s))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    let time = time.with_context(|| format!("Invalid date: {}", s))?;
    Ok(time.and_utc().timestamp())
}

fn window_from_args(cli: &Cli) -> Result<Option<DateWindow>> {
    match (&cli.begin, &cli.end) {
        (None, None) => Ok(None),
        (begin, end) => {
            let begin = begin.as_deref().map(|s| parse_day(s, false)).transpose()?.unwrap_or(0);
            let end = end.as_deref().map(|s| parse_day(s, true)).transpose()?.unwrap_or(i64::MAX);
            Ok(Some(DateWindow::new(begin, end)?))
        }
    }
}

fn format_day(ts: Option<i64>) -> String {
    ts.and_then(|t| chrono::DateTime::from_timestamp(t, 0))
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".into())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();

    println!(
        "{}\n{}\n",
        "ruascope - DMARC RUA Mailbox Analyzer".bold().green(),
        "Extracting, parsing & aggregating DMARC reports".dimmed()
    );

    let mut config = Config::new().context("Failed to load configuration")?;
    config.top_n = cli.top;

    let db: ProviderDb = match &cli.fingerprints {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read fingerprint dictionary {}", path.display()))?;
            ProviderDb::from_json(&json).context("Failed to load fingerprint dictionary")?
        }
        None => BUILTIN_DB.clone(),
    };
    log::debug!("fingerprint dictionary: {} rule(s)", db.len());

    let window = window_from_args(&cli)?;

    log::info!("Processing mailbox: {}", cli.mbox.display());
    let mailbox = std::fs::read(&cli.mbox)
        .with_context(|| format!("Failed to read {}", cli.mbox.display()))?;

    let out = run_pipeline(&mailbox, window, &config, &db)?;
    let (summary, diags) = (out.summary, out.diagnostics);

    for diag in &diags {
        log::warn!("{}", diag);
    }

    // Total extraction failure: nothing parsed at all and at least one skip.
    // The summary's report_count is window-filtered and must not be used here.
    if out.parsed_reports == 0 && diags.iter().any(|d| d.severity == Severity::Skip) {
        bail!(
            "no reports could be extracted ({} attachment(s)/report(s) skipped)",
            diags.iter().filter(|d| d.severity == Severity::Skip).count()
        );
    }

    match cli.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            wtr.write_record(["section", "key", "count"])?;
            wtr.write_record(["summary", "reports", &summary.report_count.to_string()])?;
            wtr.write_record(["summary", "records", &summary.record_count.to_string()])?;
            wtr.write_record(["summary", "unique_ips", &summary.unique_source_ips.to_string()])?;
            wtr.write_record(["summary", "passed", &summary.pass_count.to_string()])?;
            wtr.write_record(["summary", "failed", &summary.fail_count.to_string()])?;
            for entry in &summary.top_failing_ips {
                wtr.write_record(["top_failing_ip", &entry.key, &entry.count.to_string()])?;
            }
            for entry in &summary.top_reporting_domains {
                wtr.write_record(["top_domain", &entry.key, &entry.count.to_string()])?;
            }
            for entry in &summary.top_providers {
                wtr.write_record(["top_provider", &entry.key, &entry.count.to_string()])?;
            }
            for ip in &summary.unknown_sources {
                wtr.write_record(["unknown_source", ip, ""])?;
            }
            wtr.flush()?;
        }
        OutputFormat::Table => {
            println!("{}", "Summary".bold().blue());
            println!("{}", "----------------------------".dimmed());
            let mut table = Table::new();
            table.add_row(row!["Reports", summary.report_count]);
            table.add_row(row!["Records (messages)", summary.record_count]);
            table.add_row(row!["Unique sending IPs", summary.unique_source_ips]);
            table.add_row(row![
                "Passed",
                format!("{} ({:.1}%)", summary.pass_count, summary.pass_percentage)
            ]);
            table.add_row(row![
                "Failed",
                format!("{} ({:.1}%)", summary.fail_count, summary.fail_percentage)
            ]);
            table.add_row(row![
                "Date range",
                format!("{} - {}", format_day(summary.date_begin), format_day(summary.date_end))
            ]);
            table.printstd();

            print_top("Top Failing IPs", &summary.top_failing_ips);
            print_top("Top Reporting Domains", &summary.top_reporting_domains);
            print_top("Top Providers", &summary.top_providers);

            if !summary.unknown_sources.is_empty() {
                println!("\n{}", "Unknown Sources".bold().yellow());
                for ip in &summary.unknown_sources {
                    println!("  {}", ip);
                }
            }
        }
    }

    if !diags.is_empty() {
        eprintln!(
            "{}",
            format!("{} attachment(s)/record(s) skipped or dropped; run with -v for details", diags.len())
                .yellow()
        );
    }

    log::info!("{}", "Analysis complete!".bold().cyan());
    Ok(())
}

fn print_top(title: &str, entries: &[ruascope::aggregate::SummaryEntry]) {
    println!("\n{}", title.bold().blue());
    if entries.is_empty() {
        println!("{}", "  (none)".dimmed());
        return;
    }
    let mut table = Table::new();
    table.add_row(row!["Key", "Count"]);
    for entry in entries {
        table.add_row(row![entry.key, entry.count]);
    }
    table.printstd();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parsing() {
        assert!(matches!(OutputFormat::from_str("table"), Ok(OutputFormat::Table)));
        assert!(matches!(OutputFormat::from_str("csv"), Ok(OutputFormat::Csv)));
        assert!(matches!(OutputFormat::from_str("json"), Ok(OutputFormat::Json)));
        assert!(OutputFormat::from_str("invalid").is_err());
    }

    #[test]
    fn test_parse_day_bounds() {
        let begin = parse_day("2026-08-01", false).unwrap();
        let end = parse_day("2026-08-01", true).unwrap();
        assert_eq!(end - begin, 86399);
        assert!(parse_day("08/01/2026", false).is_err());
    }
}
