//! Configuration Module
//!
//! This module reads configuration values from environment variables, provides
//! sensible defaults, and validates key security parameters such as maximum
//! attachment sizes and decompression limits.

use anyhow::Result;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum size of a single attachment before decompression.
    pub max_attachment_size: usize,
    /// Hard ceiling on decompressed output, per attachment.
    pub max_decompressed_size: usize,
    pub max_files_in_zip: usize,
    pub max_compression_ratio: f64,
    /// When set, a record with a non-numeric count is kept with count = 1
    /// instead of being dropped.
    pub lenient_counts: bool,
    /// Length of the top-N lists in the summary.
    pub top_n: usize,
}

impl Config {
    /// Creates a new configuration by reading environment variables.
    /// If a variable is missing or empty, a default value is used.
    pub fn new() -> Result<Self> {
        let max_attachment_size = env::var("RUASCOPE_MAX_ATTACHMENT_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10 * 1024 * 1024);

        if max_attachment_size > 500_000_000 {
            return Err(anyhow::anyhow!("Max attachment size too large (500MB limit)"));
        }

        let max_decompressed_size = env::var("RUASCOPE_MAX_DECOMPRESSED_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100 * 1024 * 1024);

        let max_files_in_zip = env::var("RUASCOPE_MAX_FILES_IN_ZIP")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);

        let max_compression_ratio = env::var("RUASCOPE_MAX_COMPRESSION_RATIO")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000.0);

        let lenient_counts = env::var("RUASCOPE_LENIENT_COUNTS")
            .map(|s| matches!(s.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let top_n = env::var("RUASCOPE_TOP_N")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Config {
            max_attachment_size,
            max_decompressed_size,
            max_files_in_zip,
            max_compression_ratio,
            lenient_counts,
            top_n,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_attachment_size: 10 * 1024 * 1024,
            max_decompressed_size: 100 * 1024 * 1024,
            max_files_in_zip: 1000,
            max_compression_ratio: 1000.0,
            lenient_counts: false,
            top_n: 5,
        }
    }
}
