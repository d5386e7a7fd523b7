//! Pipeline Module
//!
//! The single entry point the presentation layer calls: raw mailbox bytes and
//! an optional date window in, `Summary` plus diagnostics out. Each invocation
//! is an independent, side-effect-free batch transform over immutable input;
//! nothing is shared across runs.

use log::debug;

use crate::aggregate::{aggregate, DateWindow, Summary};
use crate::classifier::ProviderDb;
use crate::config::Config;
use crate::diag::Diagnostic;
use crate::error::{Result, RuaError};
use crate::extract::extract_attachments;
use crate::xml_parser::parse_report;

/// Result of one pipeline run.
#[derive(Debug)]
pub struct PipelineOutput {
    pub summary: Summary,
    pub diagnostics: Vec<Diagnostic>,
    /// Reports successfully parsed, before any date-window filtering. The
    /// summary's `report_count` is the post-filter figure; a wrapper deciding
    /// whether extraction failed outright must look at this one.
    pub parsed_reports: usize,
}

/// Runs extraction, parsing, classification and aggregation over one mailbox.
///
/// Attachment and report failures are downgraded to diagnostics and never
/// abort the batch. The only hard failure is an invalid date window, surfaced
/// before any extraction work.
pub fn run_pipeline(
    mailbox: &[u8],
    window: Option<DateWindow>,
    config: &Config,
    db: &ProviderDb,
) -> Result<PipelineOutput> {
    if let Some(w) = window {
        if w.begin > w.end {
            return Err(RuaError::InvalidRange { begin: w.begin, end: w.end });
        }
    }

    let mut diags = Vec::new();
    let buffers = extract_attachments(mailbox, config, &mut diags);
    debug!("extracted {} xml buffer(s)", buffers.len());

    let mut reports = Vec::new();
    for buffer in &buffers {
        match parse_report(&buffer.content, config, &mut diags) {
            Ok(report) => reports.push(report),
            Err(e) => diags.push(Diagnostic::skip(format!("{}: report dropped: {}", buffer.name, e))),
        }
    }
    debug!("parsed {} report(s)", reports.len());

    let summary = aggregate(&reports, window, db, config.top_n)?;
    Ok(PipelineOutput {
        summary,
        diagnostics: diags,
        parsed_reports: reports.len(),
    })
}
