//! XML Parser Module
//!
//! This module parses one DMARC aggregate report XML buffer into a `Report`.
//! The parse is schema-light: element names are matched wherever the reporting
//! organization happened to nest them, which tolerates the minor schema
//! variation seen across reporters. It enforces a recursion depth limit to
//! protect against attacks such as the Billion Laughs attack and strips any
//! DOCTYPE block from the input, rejecting blocks that define two or more
//! entities.
//!
//! Fatality rules: a missing or inverted `date_range` fails the whole report;
//! everything else degrades. A record missing its `source_ip`, or carrying a
//! bad `count`, is dropped with a warn diagnostic and the rest of the report
//! survives. An empty record list is a valid report.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::config::Config;
use crate::diag::Diagnostic;
use crate::error::{Result, RuaError};
use crate::models::{DateRange, DmarcRecord, Report};

const MAX_DEPTH: u32 = 20;

#[derive(Default)]
struct RecordDraft {
    source_ip: Option<String>,
    count_text: Option<String>,
    disposition: Option<String>,
    dkim: Option<String>,
    spf: Option<String>,
    header_from: Option<String>,
    envelope_from: Option<String>,
}

impl RecordDraft {
    /// Finalizes the draft, or explains why the row must be dropped.
    ///
    /// Count policy: a non-numeric (or absent) count drops the row unless
    /// `lenient` is set, in which case the row is kept with count = 1. A zero
    /// count always drops the row.
    fn finish(self, lenient: bool) -> std::result::Result<DmarcRecord, String> {
        let source_ip = match self.source_ip {
            Some(ip) if !ip.is_empty() => ip,
            _ => return Err("missing source_ip".into()),
        };
        let count = match self.count_text.as_deref().map(str::parse::<u64>) {
            Some(Ok(0)) => return Err(format!("{}: zero count", source_ip)),
            Some(Ok(n)) => n,
            Some(Err(_)) | None if lenient => 1,
            Some(Err(_)) => return Err(format!("{}: non-numeric count", source_ip)),
            None => return Err(format!("{}: missing count", source_ip)),
        };
        Ok(DmarcRecord {
            source_ip,
            count,
            disposition: self.disposition.as_deref().and_then(|s| s.parse().ok()).unwrap_or_default(),
            dkim: self.dkim.as_deref().and_then(|s| s.parse().ok()).unwrap_or_default(),
            spf: self.spf.as_deref().and_then(|s| s.parse().ok()).unwrap_or_default(),
            header_from: self.header_from.filter(|s| !s.is_empty()),
            envelope_from: self.envelope_from.filter(|s| !s.is_empty()),
        })
    }
}

/// Parses DMARC report XML into a `Report`.
///
/// # Errors
///
/// Fails when the buffer is not well-formed XML, when the mandatory
/// `date_range` is absent or inverted, when the recursion depth limit is
/// exceeded, or when a DOCTYPE block defines two or more entities.
pub fn parse_report(xml: &str, config: &Config, diags: &mut Vec<Diagnostic>) -> Result<Report> {
    let cleaned = strip_doctype(xml)?;

    let mut reader = Reader::from_str(&cleaned);
    reader.config_mut().trim_text(true);

    let mut org_name: Option<String> = None;
    let mut report_id: Option<String> = None;
    let mut policy_domain: Option<String> = None;
    let mut date_begin: Option<i64> = None;
    let mut date_end: Option<i64> = None;
    let mut records = Vec::new();
    let mut current: Option<RecordDraft> = None;
    let mut in_policy_evaluated = false;
    let mut depth: u32 = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                if depth > MAX_DEPTH {
                    return Err(RuaError::Parse("XML recursion depth limit exceeded".into()));
                }
                match e.name().as_ref() {
                    b"record" => {
                        current = Some(RecordDraft::default());
                    }
                    b"policy_evaluated" => in_policy_evaluated = true,
                    b"org_name" if current.is_none() => {
                        org_name = Some(reader.read_text(e.name())?.trim().to_string());
                        depth -= 1;
                    }
                    b"report_id" if current.is_none() => {
                        report_id = Some(reader.read_text(e.name())?.trim().to_string());
                        depth -= 1;
                    }
                    b"domain" if current.is_none() && policy_domain.is_none() => {
                        policy_domain = Some(reader.read_text(e.name())?.trim().to_string());
                        depth -= 1;
                    }
                    b"begin" if current.is_none() => {
                        date_begin = reader.read_text(e.name())?.trim().parse().ok();
                        depth -= 1;
                    }
                    b"end" if current.is_none() => {
                        date_end = reader.read_text(e.name())?.trim().parse().ok();
                        depth -= 1;
                    }
                    b"source_ip" => {
                        if let Some(draft) = current.as_mut() {
                            draft.source_ip = Some(reader.read_text(e.name())?.trim().to_string());
                            depth -= 1;
                        }
                    }
                    b"count" => {
                        if let Some(draft) = current.as_mut() {
                            draft.count_text = Some(reader.read_text(e.name())?.trim().to_string());
                            depth -= 1;
                        }
                    }
                    b"disposition" if in_policy_evaluated => {
                        if let Some(draft) = current.as_mut() {
                            draft.disposition = Some(reader.read_text(e.name())?.trim().to_string());
                            depth -= 1;
                        }
                    }
                    // Only the policy_evaluated verdicts are pass/fail; the
                    // auth_results dkim/spf blocks carry raw mechanism output
                    // and are deliberately not consumed here.
                    b"dkim" if in_policy_evaluated => {
                        if let Some(draft) = current.as_mut() {
                            draft.dkim = Some(reader.read_text(e.name())?.trim().to_string());
                            depth -= 1;
                        }
                    }
                    b"spf" if in_policy_evaluated => {
                        if let Some(draft) = current.as_mut() {
                            draft.spf = Some(reader.read_text(e.name())?.trim().to_string());
                            depth -= 1;
                        }
                    }
                    b"header_from" => {
                        if let Some(draft) = current.as_mut() {
                            draft.header_from = Some(reader.read_text(e.name())?.trim().to_string());
                            depth -= 1;
                        }
                    }
                    b"envelope_from" => {
                        if let Some(draft) = current.as_mut() {
                            draft.envelope_from = Some(reader.read_text(e.name())?.trim().to_string());
                            depth -= 1;
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                match e.name().as_ref() {
                    b"record" => {
                        if let Some(draft) = current.take() {
                            match draft.finish(config.lenient_counts) {
                                Ok(record) => records.push(record),
                                Err(why) => {
                                    diags.push(Diagnostic::warn(format!("record dropped: {}", why)));
                                }
                            }
                        }
                    }
                    b"policy_evaluated" => in_policy_evaluated = false,
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(RuaError::Xml(e)),
            _ => (),
        }
    }

    let date_range = match (date_begin, date_end) {
        (Some(begin), Some(end)) if begin <= end => DateRange { begin, end },
        (Some(begin), Some(end)) => {
            return Err(RuaError::Parse(format!(
                "malformed date_range: begin {} after end {}",
                begin, end
            )))
        }
        _ => return Err(RuaError::Parse("missing mandatory date_range".into())),
    };

    Ok(Report {
        org_name: org_name.filter(|s| !s.is_empty()).unwrap_or_else(|| "unknown".into()),
        report_id: report_id.filter(|s| !s.is_empty()),
        policy_domain: policy_domain.filter(|s| !s.is_empty()),
        date_range,
        records,
    })
}

/// Removes a DOCTYPE block, rejecting any that defines two or more entities.
fn strip_doctype(xml: &str) -> Result<String> {
    if let Some(start) = xml.find("<!DOCTYPE") {
        if let Some(end) = xml[start..].find("]>") {
            let doctype = &xml[start..start + end + 2];
            if doctype.matches("<!ENTITY").count() >= 2 {
                return Err(RuaError::Parse("recursive entities detected".into()));
            }
            return Ok(format!("{}{}", &xml[..start], &xml[start + end + 2..]));
        }
    }
    Ok(xml.to_string())
}
