//! Error Handling Module
//!
//! This module defines custom error types for ruascope using the `thiserror` crate.
//! Non-fatal conditions (skipped attachments, dropped records) are not errors;
//! they travel as `Diagnostic`s next to the result.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid fingerprint rule: {0}")]
    Fingerprint(String),

    #[error("File too large: {0}")]
    FileTooLarge(String),

    #[error("Invalid date range: begin {begin} is after end {end}")]
    InvalidRange { begin: i64, end: i64 },
}

pub type Result<T> = std::result::Result<T, RuaError>;
