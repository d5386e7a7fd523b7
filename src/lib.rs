//! ruascope Library
//!
//! This library provides the core functionality for ruascope: configuration,
//! error handling, data models, mailbox attachment extraction, DMARC report
//! XML parsing, provider classification, and count-weighted aggregation.

pub mod aggregate;
pub mod classifier;
pub mod config;
pub mod diag;
pub mod error;
pub mod extract;
pub mod models;
pub mod pipeline;
pub mod xml_parser;

pub use aggregate::{aggregate, DateWindow, Summary};
pub use classifier::{ProviderDb, BUILTIN_DB};
pub use config::Config;
pub use diag::Diagnostic;
pub use extract::extract_attachments;
pub use pipeline::{run_pipeline, PipelineOutput};
pub use xml_parser::parse_report;
