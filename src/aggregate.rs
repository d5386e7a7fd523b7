//! Aggregator Module
//!
//! Merges many parsed reports into one `Summary`: count-weighted totals,
//! pass/fail rates, top failing IPs, top reporting domains, top providers,
//! and the deduplicated set of unknown sources, optionally restricted to
//! reports whose date range overlaps a caller-supplied window.
//!
//! Accumulation is a pure reduction over an explicit `Accumulator` value with
//! an associative, commutative `merge`, so several archives can be aggregated
//! independently and combined afterwards with identical results.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::classifier::ProviderDb;
use crate::error::{Result, RuaError};
use crate::models::{DateRange, Report};

/// Caller-supplied date window, in Unix timestamps. `begin > end` is a
/// caller-contract violation and fails fast before any accumulation.
#[derive(Debug, Clone, Copy)]
pub struct DateWindow {
    pub begin: i64,
    pub end: i64,
}

impl DateWindow {
    pub fn new(begin: i64, end: i64) -> Result<Self> {
        if begin > end {
            return Err(RuaError::InvalidRange { begin, end });
        }
        Ok(Self { begin, end })
    }

    fn as_range(&self) -> DateRange {
        DateRange { begin: self.begin, end: self.end }
    }
}

/// Count-weighted accumulation state. All maps are keyed deterministically
/// (`BTreeMap`/`BTreeSet`) so identical input yields identical output
/// regardless of traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accumulator {
    pub report_count: u64,
    /// Sum of record counts, not number of rows.
    pub record_count: u64,
    pub pass_count: u64,
    pub fail_count: u64,
    pub fail_by_ip: BTreeMap<String, u64>,
    pub count_by_domain: BTreeMap<String, u64>,
    pub count_by_provider: BTreeMap<String, u64>,
    pub source_ips: BTreeSet<String>,
    pub unknown_sources: BTreeSet<String>,
    /// Min begin / max end over the included reports.
    pub observed_range: Option<DateRange>,
}

impl Accumulator {
    fn add_report(&mut self, report: &Report, db: &ProviderDb) {
        self.report_count += 1;
        self.observed_range = Some(match self.observed_range {
            Some(seen) => DateRange {
                begin: seen.begin.min(report.date_range.begin),
                end: seen.end.max(report.date_range.end),
            },
            None => report.date_range,
        });
        for record in &report.records {
            let count = record.count;
            self.record_count += count;
            self.source_ips.insert(record.source_ip.clone());
            if record.overall_pass() {
                self.pass_count += count;
            } else {
                self.fail_count += count;
                *self.fail_by_ip.entry(record.source_ip.clone()).or_default() += count;
            }
            if let Some(domain) = record.domain() {
                *self.count_by_domain.entry(domain.to_string()).or_default() += count;
            }
            // The envelope From usually carries the sending service's bounce
            // domain, which is the strongest name hint we have.
            let hint = record.envelope_from.as_deref().or(record.header_from.as_deref());
            match db.classify(&record.source_ip, hint) {
                Some(provider) => {
                    *self.count_by_provider.entry(provider.to_string()).or_default() += count;
                }
                None => {
                    self.unknown_sources.insert(record.source_ip.clone());
                }
            }
        }
    }

    /// Element-wise addition of counts and union of sets. Associative and
    /// commutative, so partial accumulators combine in any order.
    pub fn merge(mut self, other: Accumulator) -> Accumulator {
        self.report_count += other.report_count;
        self.record_count += other.record_count;
        self.pass_count += other.pass_count;
        self.fail_count += other.fail_count;
        for (k, v) in other.fail_by_ip {
            *self.fail_by_ip.entry(k).or_default() += v;
        }
        for (k, v) in other.count_by_domain {
            *self.count_by_domain.entry(k).or_default() += v;
        }
        for (k, v) in other.count_by_provider {
            *self.count_by_provider.entry(k).or_default() += v;
        }
        self.source_ips.extend(other.source_ips);
        self.unknown_sources.extend(other.unknown_sources);
        self.observed_range = match (self.observed_range, other.observed_range) {
            (Some(a), Some(b)) => Some(DateRange {
                begin: a.begin.min(b.begin),
                end: a.end.max(b.end),
            }),
            (a, b) => a.or(b),
        };
        self
    }

    /// Produces the presentation-ready summary. Top lists are sorted by
    /// descending count with a lexical tie-break on the key.
    pub fn finish(&self, top_n: usize) -> Summary {
        let (pass_percentage, fail_percentage) = if self.record_count == 0 {
            (0.0, 0.0)
        } else {
            let total = self.record_count as f64;
            (
                100.0 * self.pass_count as f64 / total,
                100.0 * self.fail_count as f64 / total,
            )
        };
        Summary {
            report_count: self.report_count,
            record_count: self.record_count,
            unique_source_ips: self.source_ips.len() as u64,
            pass_count: self.pass_count,
            fail_count: self.fail_count,
            pass_percentage,
            fail_percentage,
            date_begin: self.observed_range.map(|r| r.begin),
            date_end: self.observed_range.map(|r| r.end),
            top_failing_ips: top_entries(&self.fail_by_ip, top_n),
            top_reporting_domains: top_entries(&self.count_by_domain, top_n),
            top_providers: top_entries(&self.count_by_provider, top_n),
            unknown_sources: self.unknown_sources.iter().cloned().collect(),
        }
    }
}

fn top_entries(map: &BTreeMap<String, u64>, top_n: usize) -> Vec<SummaryEntry> {
    // BTreeMap iterates in key order; the stable sort preserves that order
    // among equal counts, which is exactly the lexical tie-break.
    let mut entries: Vec<SummaryEntry> = map
        .iter()
        .map(|(key, &count)| SummaryEntry { key: key.clone(), count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries.truncate(top_n);
    entries
}

/// One row of a summary top list.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SummaryEntry {
    pub key: String,
    pub count: u64,
}

/// Aggregate statistics over one batch. Plain structured data; no formatting
/// assumptions, so any presentation layer can consume it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Summary {
    pub report_count: u64,
    pub record_count: u64,
    pub unique_source_ips: u64,
    pub pass_count: u64,
    pub fail_count: u64,
    pub pass_percentage: f64,
    pub fail_percentage: f64,
    pub date_begin: Option<i64>,
    pub date_end: Option<i64>,
    pub top_failing_ips: Vec<SummaryEntry>,
    pub top_reporting_domains: Vec<SummaryEntry>,
    pub top_providers: Vec<SummaryEntry>,
    pub unknown_sources: Vec<String>,
}

/// Builds the accumulator for a report set, applying the report-level date
/// window filter (inclusive overlap; a report touching the boundary is
/// included in full).
pub fn accumulate(
    reports: &[Report],
    window: Option<DateWindow>,
    db: &ProviderDb,
) -> Result<Accumulator> {
    if let Some(w) = window {
        // Fail fast on a caller-contract violation, before touching reports.
        if w.begin > w.end {
            return Err(RuaError::InvalidRange { begin: w.begin, end: w.end });
        }
    }
    let mut acc = Accumulator::default();
    for report in reports {
        if let Some(w) = window {
            if !report.date_range.overlaps(&w.as_range()) {
                continue;
            }
        }
        acc.add_report(report, db);
    }
    Ok(acc)
}

/// Merges reports into summary statistics, optionally scoped to `window`.
pub fn aggregate(
    reports: &[Report],
    window: Option<DateWindow>,
    db: &ProviderDb,
    top_n: usize,
) -> Result<Summary> {
    Ok(accumulate(reports, window, db)?.finish(top_n))
}
