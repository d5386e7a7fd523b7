//! Provider Classifier Module
//!
//! Classifies a record's source IP (plus an optional organization-name hint)
//! against an ordered fingerprint dictionary. Evaluation is top-to-bottom and
//! the first matching rule wins, so dictionary authors must list specific
//! rules (exact IP, narrow CIDR) before broad ones (wide CIDR, name
//! substring). The classifier never re-sorts and never touches the network;
//! classification is a pure function of (ip, hint, dictionary) so results are
//! reproducible offline and across runs.

use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;
use lazy_static::lazy_static;
use serde::Deserialize;

use crate::error::{Result, RuaError};

/// How a single fingerprint rule matches.
#[derive(Debug, Clone)]
pub enum MatchRule {
    /// Exact source IP equality.
    Exact(IpAddr),
    /// Source IP contained in a CIDR block.
    Cidr(IpNetwork),
    /// Case-insensitive substring of the organization-name hint. The needle
    /// is lowercased at match time, so rules built directly through
    /// `ProviderDb::new` behave the same as loaded ones.
    Substring(String),
}

#[derive(Debug, Clone)]
pub struct ProviderRule {
    pub rule: MatchRule,
    pub provider: String,
}

impl ProviderRule {
    fn matches(&self, ip: Option<IpAddr>, hint: Option<&str>) -> bool {
        match &self.rule {
            MatchRule::Exact(addr) => ip == Some(*addr),
            MatchRule::Cidr(net) => ip.map(|i| net.contains(i)).unwrap_or(false),
            MatchRule::Substring(needle) => hint
                .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
        }
    }
}

/// Wire format of a dictionary entry: a (kind, value, provider) triple.
#[derive(Debug, Deserialize)]
struct RawRule {
    kind: RawKind,
    value: String,
    provider: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum RawKind {
    IpExact,
    IpCidr,
    NameSubstring,
}

/// An ordered provider-fingerprint dictionary. Loaded once at process start
/// and treated as immutable for the lifetime of the run.
#[derive(Debug, Clone)]
pub struct ProviderDb {
    rules: Vec<ProviderRule>,
}

impl ProviderDb {
    pub fn new(rules: Vec<ProviderRule>) -> Self {
        Self { rules }
    }

    /// Loads a dictionary from its JSON wire format: an ordered array of
    /// `{"kind": "ip-exact" | "ip-cidr" | "name-substring", "value": ..., "provider": ...}`.
    ///
    /// # Errors
    ///
    /// Fails when the JSON is malformed or a rule value does not parse as the
    /// kind requires; a dictionary with a bad rule is wrong as a whole.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Vec<RawRule> =
            serde_json::from_str(json).map_err(|e| RuaError::Fingerprint(e.to_string()))?;
        let mut rules = Vec::with_capacity(raw.len());
        for entry in raw {
            let rule = match entry.kind {
                RawKind::IpExact => MatchRule::Exact(
                    IpAddr::from_str(&entry.value)
                        .map_err(|_| RuaError::Fingerprint(format!("bad IP: {}", entry.value)))?,
                ),
                RawKind::IpCidr => MatchRule::Cidr(
                    IpNetwork::from_str(&entry.value)
                        .map_err(|_| RuaError::Fingerprint(format!("bad CIDR: {}", entry.value)))?,
                ),
                RawKind::NameSubstring => MatchRule::Substring(entry.value.to_lowercase()),
            };
            rules.push(ProviderRule { rule, provider: entry.provider });
        }
        Ok(Self { rules })
    }

    /// Returns the label of the first matching rule, or `None` for an unknown
    /// source. An unparseable IP can still match a name-substring rule.
    pub fn classify(&self, source_ip: &str, org_hint: Option<&str>) -> Option<&str> {
        let ip = IpAddr::from_str(source_ip.trim()).ok();
        self.rules
            .iter()
            .find(|r| r.matches(ip, org_hint))
            .map(|r| r.provider.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

lazy_static! {
    /// Built-in dictionary covering the large consumer and transactional mail
    /// providers. Published sender ranges, narrowest first per provider.
    pub static ref BUILTIN_DB: ProviderDb = ProviderDb::from_json(BUILTIN_RULES)
        .expect("built-in fingerprint dictionary is valid");
}

const BUILTIN_RULES: &str = r#"[
  {"kind": "ip-cidr", "value": "209.85.128.0/17", "provider": "Google"},
  {"kind": "ip-cidr", "value": "74.125.0.0/16", "provider": "Google"},
  {"kind": "ip-cidr", "value": "2607:f8b0::/32", "provider": "Google"},
  {"kind": "ip-cidr", "value": "40.92.0.0/15", "provider": "Microsoft"},
  {"kind": "ip-cidr", "value": "40.107.0.0/16", "provider": "Microsoft"},
  {"kind": "ip-cidr", "value": "52.100.0.0/14", "provider": "Microsoft"},
  {"kind": "ip-cidr", "value": "98.136.0.0/14", "provider": "Yahoo"},
  {"kind": "ip-cidr", "value": "74.6.0.0/16", "provider": "Yahoo"},
  {"kind": "ip-cidr", "value": "54.240.0.0/18", "provider": "Amazon SES"},
  {"kind": "ip-cidr", "value": "69.169.224.0/20", "provider": "Amazon SES"},
  {"kind": "ip-cidr", "value": "149.72.0.0/16", "provider": "SendGrid"},
  {"kind": "ip-cidr", "value": "167.89.0.0/17", "provider": "SendGrid"},
  {"kind": "ip-cidr", "value": "198.2.128.0/18", "provider": "Mailchimp"},
  {"kind": "ip-cidr", "value": "146.20.112.0/20", "provider": "Mailgun"},
  {"kind": "name-substring", "value": "google", "provider": "Google"},
  {"kind": "name-substring", "value": "outlook", "provider": "Microsoft"},
  {"kind": "name-substring", "value": "yahoo", "provider": "Yahoo"},
  {"kind": "name-substring", "value": "amazonses", "provider": "Amazon SES"},
  {"kind": "name-substring", "value": "sendgrid", "provider": "SendGrid"}
]"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn small_db() -> ProviderDb {
        ProviderDb::from_json(
            r#"[
              {"kind": "ip-exact", "value": "203.0.113.5", "provider": "Pinned"},
              {"kind": "ip-cidr", "value": "203.0.113.0/24", "provider": "TestNet"},
              {"kind": "name-substring", "value": "mail.example", "provider": "ExampleMail"}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_first_match_wins_over_later_rules() {
        let db = small_db();
        // Both the exact rule and the /24 match; the earlier rule must win.
        assert_eq!(db.classify("203.0.113.5", None), Some("Pinned"));
        assert_eq!(db.classify("203.0.113.77", None), Some("TestNet"));
    }

    #[test]
    fn test_substring_hint_matching() {
        let db = small_db();
        assert_eq!(db.classify("198.51.100.1", Some("out.MAIL.example.net")), Some("ExampleMail"));
        assert_eq!(db.classify("198.51.100.1", Some("unrelated.org")), None);
        assert_eq!(db.classify("198.51.100.1", None), None);
    }

    #[test]
    fn test_mixed_case_needle_via_new() {
        // Rules assembled by hand, not through from_json, must match too.
        let db = ProviderDb::new(vec![ProviderRule {
            rule: MatchRule::Substring("Google".into()),
            provider: "Google".into(),
        }]);
        assert_eq!(db.classify("198.51.100.1", Some("mail-ed1.GOOGLE.com")), Some("Google"));
    }

    #[test]
    fn test_unknown_source() {
        let db = small_db();
        assert_eq!(db.classify("198.51.100.1", None), None);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let db = small_db();
        let first = db.classify("203.0.113.5", Some("mail.example.com")).map(String::from);
        for _ in 0..10 {
            assert_eq!(db.classify("203.0.113.5", Some("mail.example.com")).map(String::from), first);
        }
    }

    #[test]
    fn test_ipv6_cidr_matching() {
        let db = ProviderDb::from_json(
            r#"[{"kind": "ip-cidr", "value": "2001:db8::/32", "provider": "DocNet"}]"#,
        )
        .unwrap();
        assert_eq!(db.classify("2001:db8::25", None), Some("DocNet"));
        assert_eq!(db.classify("2001:db9::25", None), None);
    }

    #[test]
    fn test_bad_rule_fails_load() {
        let result = ProviderDb::from_json(
            r#"[{"kind": "ip-cidr", "value": "not-a-cidr", "provider": "X"}]"#,
        );
        assert!(matches!(result, Err(RuaError::Fingerprint(_))));
    }

    #[test]
    fn test_builtin_dictionary_loads() {
        assert!(!BUILTIN_DB.is_empty());
        assert_eq!(BUILTIN_DB.classify("209.85.200.10", None), Some("Google"));
    }
}
