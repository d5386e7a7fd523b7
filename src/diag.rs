//! Diagnostics Module
//!
//! Skip/warn notices collected while a batch runs. A malformed attachment or
//! record never aborts the batch; it is recorded here and processing continues,
//! so the caller can report "N attachments skipped, M records dropped" without
//! losing the computed summary.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// An attachment or report was skipped entirely.
    Skip,
    /// A single record was dropped or a value was coerced.
    Warn,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn skip(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Skip,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warn,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Skip => write!(f, "skip: {}", self.message),
            Severity::Warn => write!(f, "warn: {}", self.message),
        }
    }
}
