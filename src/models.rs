//! Data Models Module
//!
//! This module defines the core data structures used by ruascope to represent
//! DMARC aggregate reports and their evaluation rows, along with conversions
//! from the strings found in report XML.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One DMARC aggregate (RUA) report, as parsed from a single XML buffer.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Report {
    /// Reporting organization. Metadata only; "unknown" when absent.
    pub org_name: String,
    /// Report identifier from the metadata block, if present.
    pub report_id: Option<String>,
    /// Domain the published policy applies to, if present.
    pub policy_domain: Option<String>,
    pub date_range: DateRange,
    /// Rows in document order. Order is irrelevant for aggregation but
    /// preserved for traceability.
    pub records: Vec<DmarcRecord>,
}

/// Reporting period, as Unix timestamps (UTC seconds).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub begin: i64,
    pub end: i64,
}

impl DateRange {
    /// Inclusive overlap test against another range.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.end >= other.begin && self.begin <= other.end
    }
}

/// One DMARC evaluation row. `count` is the number of messages the row
/// represents; DMARC reports are already count-aggregated.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DmarcRecord {
    pub source_ip: String,
    pub count: u64,
    pub disposition: Disposition,
    pub dkim: AuthVerdict,
    pub spf: AuthVerdict,
    pub header_from: Option<String>,
    pub envelope_from: Option<String>,
}

impl DmarcRecord {
    /// DMARC alignment semantics: a row passes if either DKIM or SPF passed.
    pub fn overall_pass(&self) -> bool {
        self.dkim == AuthVerdict::Pass || self.spf == AuthVerdict::Pass
    }

    /// Domain the row is attributed to: header From, falling back to the
    /// envelope From when the header identifier is absent.
    pub fn domain(&self) -> Option<&str> {
        self.header_from
            .as_deref()
            .or(self.envelope_from.as_deref())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    #[default]
    None,
    Quarantine,
    Reject,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthVerdict {
    Pass,
    #[default]
    Fail,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::None => write!(f, "none"),
            Disposition::Quarantine => write!(f, "quarantine"),
            Disposition::Reject => write!(f, "reject"),
        }
    }
}

impl fmt::Display for AuthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthVerdict::Pass => write!(f, "pass"),
            AuthVerdict::Fail => write!(f, "fail"),
        }
    }
}

impl FromStr for Disposition {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Disposition::None),
            "quarantine" => Ok(Disposition::Quarantine),
            "reject" => Ok(Disposition::Reject),
            _ => Err(format!("Invalid disposition: {}", s)),
        }
    }
}

impl FromStr for AuthVerdict {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pass" => Ok(AuthVerdict::Pass),
            "fail" => Ok(AuthVerdict::Fail),
            _ => Err(format!("Invalid auth verdict: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_pass_alignment() {
        let mut record = DmarcRecord {
            source_ip: "203.0.113.5".into(),
            count: 1,
            disposition: Disposition::None,
            dkim: AuthVerdict::Fail,
            spf: AuthVerdict::Pass,
            header_from: None,
            envelope_from: None,
        };
        assert!(record.overall_pass());
        record.spf = AuthVerdict::Fail;
        assert!(!record.overall_pass());
        record.dkim = AuthVerdict::Pass;
        assert!(record.overall_pass());
    }

    #[test]
    fn test_domain_fallback() {
        let record = DmarcRecord {
            source_ip: "203.0.113.5".into(),
            count: 1,
            disposition: Disposition::None,
            dkim: AuthVerdict::Pass,
            spf: AuthVerdict::Pass,
            header_from: None,
            envelope_from: Some("bounce.example.net".into()),
        };
        assert_eq!(record.domain(), Some("bounce.example.net"));
    }

    #[test]
    fn test_date_range_overlap_is_inclusive() {
        let report = DateRange { begin: 100, end: 200 };
        assert!(report.overlaps(&DateRange { begin: 200, end: 300 }));
        assert!(report.overlaps(&DateRange { begin: 0, end: 100 }));
        assert!(!report.overlaps(&DateRange { begin: 201, end: 300 }));
    }

    #[test]
    fn test_verdict_parsing() {
        assert_eq!(AuthVerdict::from_str("Pass"), Ok(AuthVerdict::Pass));
        assert_eq!(AuthVerdict::from_str("fail"), Ok(AuthVerdict::Fail));
        assert!(AuthVerdict::from_str("softfail").is_err());
        assert_eq!(Disposition::from_str("reject"), Ok(Disposition::Reject));
    }
}
