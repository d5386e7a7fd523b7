//! Attachment Extractor Module
//!
//! This module walks an MBOX mailbox buffer, finds candidate DMARC report
//! attachments, and decompresses them (plain, gzip, zip) into raw XML buffers.
//! It enforces security limits including attachment size, maximum decompressed
//! size, zip member count, and compression ratio. A malformed attachment is
//! recorded as a skip diagnostic and never aborts the batch.
use std::io::{Cursor, Read};

use flate2::read::GzDecoder;
use mailparse::ParsedMail;
use zip::ZipArchive;

use crate::config::Config;
use crate::diag::Diagnostic;
use crate::error::{Result, RuaError};

/// One attachment decompressed to raw bytes, ready for the XML parser.
/// Well-formedness is not checked here.
#[derive(Debug, Clone)]
pub struct RawXml {
    /// Attachment name, for diagnostics and traceability.
    pub name: String,
    pub content: String,
}

/// Compression kind of an attachment, detected from magic bytes first and
/// the filename suffix second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Zip,
}

fn detect_compression(name: &str, bytes: &[u8]) -> Compression {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        return Compression::Gzip;
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return Compression::Zip;
    }
    let lower = name.to_lowercase();
    if lower.ends_with(".gz") || lower.ends_with(".gzip") {
        Compression::Gzip
    } else if lower.ends_with(".zip") {
        Compression::Zip
    } else {
        Compression::None
    }
}

/// Extracts raw XML buffers from an MBOX mailbox.
///
/// One entry is produced per attachment successfully decompressed; skipped
/// attachments are appended to `diags` and extraction continues.
pub fn extract_attachments(
    mailbox: &[u8],
    config: &Config,
    diags: &mut Vec<Diagnostic>,
) -> Vec<RawXml> {
    let mut buffers = Vec::new();
    for (i, raw_message) in split_mbox(mailbox).into_iter().enumerate() {
        let message = match mailparse::parse_mail(raw_message) {
            Ok(m) => m,
            Err(e) => {
                diags.push(Diagnostic::skip(format!("message {}: unparseable: {}", i, e)));
                continue;
            }
        };
        collect_from_part(&message, i, config, &mut buffers, diags);
    }
    buffers
}

/// Splits an MBOX buffer into individual messages, stripping the "From "
/// separator lines. A buffer without a separator is treated as one message.
fn split_mbox(data: &[u8]) -> Vec<&[u8]> {
    if !data.starts_with(b"From ") {
        return vec![data];
    }
    let mut starts = vec![0usize];
    for (i, &b) in data.iter().enumerate() {
        if b == b'\n' && data[i + 1..].starts_with(b"From ") {
            starts.push(i + 1);
        }
    }
    let mut messages = Vec::with_capacity(starts.len());
    for (idx, &start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(data.len());
        let chunk = &data[start..end];
        // Drop the separator line itself.
        let body = match chunk.iter().position(|&b| b == b'\n') {
            Some(nl) => &chunk[nl + 1..],
            None => &[][..],
        };
        if !body.is_empty() {
            messages.push(body);
        }
    }
    messages
}

/// Walks a MIME part tree, decompressing every leaf that looks like a report
/// attachment. Non-multipart messages whose body is itself the report (zip or
/// gzip content type with no disposition) are handled the same way.
fn collect_from_part(
    part: &ParsedMail,
    msg_index: usize,
    config: &Config,
    out: &mut Vec<RawXml>,
    diags: &mut Vec<Diagnostic>,
) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_from_part(sub, msg_index, config, out, diags);
        }
        return;
    }

    let filename = part
        .get_content_disposition()
        .params
        .get("filename")
        .cloned()
        .or_else(|| part.ctype.params.get("name").cloned());
    let mimetype = part.ctype.mimetype.to_lowercase();

    if !is_report_candidate(filename.as_deref(), &mimetype) {
        return;
    }
    let name = filename.unwrap_or_else(|| format!("msg{}-body", msg_index));

    let body = match part.get_body_raw() {
        Ok(b) => b,
        Err(e) => {
            diags.push(Diagnostic::skip(format!("{}: undecodable body: {}", name, e)));
            return;
        }
    };

    match decompress_attachment(&name, &body, config) {
        Ok(Some(content)) => out.push(RawXml { name, content }),
        Ok(None) => diags.push(Diagnostic::skip(format!("{}: no report member found", name))),
        Err(e) => diags.push(Diagnostic::skip(format!("{}: {}", name, e))),
    }
}

fn is_report_candidate(filename: Option<&str>, mimetype: &str) -> bool {
    if let Some(name) = filename {
        let lower = name.to_lowercase();
        if lower.ends_with(".xml")
            || lower.ends_with(".gz")
            || lower.ends_with(".gzip")
            || lower.ends_with(".zip")
        {
            return true;
        }
    }
    matches!(
        mimetype,
        "application/zip"
            | "application/gzip"
            | "application/x-gzip"
            | "application/xml"
            | "text/xml"
    )
}

/// Decompresses one attachment into an XML string.
///
/// Returns `Ok(None)` when a zip archive holds no plausible report member.
/// Size, member count, and compression ratio violations are hard errors for
/// the attachment (the caller downgrades them to skip diagnostics).
fn decompress_attachment(name: &str, bytes: &[u8], config: &Config) -> Result<Option<String>> {
    if bytes.len() > config.max_attachment_size {
        return Err(RuaError::FileTooLarge(format!(
            "attachment is {} bytes, limit {}",
            bytes.len(),
            config.max_attachment_size
        )));
    }
    match detect_compression(name, bytes) {
        Compression::Gzip => {
            let mut decoder = GzDecoder::new(Cursor::new(bytes)).take(config.max_decompressed_size as u64 + 1);
            let mut contents = String::new();
            decoder.read_to_string(&mut contents)?;
            if contents.len() > config.max_decompressed_size {
                return Err(RuaError::FileTooLarge("decompressed gzip too large".into()));
            }
            Ok(Some(contents))
        }
        Compression::Zip => {
            let mut archive = ZipArchive::new(Cursor::new(bytes))?;
            if archive.len() > config.max_files_in_zip {
                return Err(RuaError::FileTooLarge(format!(
                    "{} members in archive, limit {}",
                    archive.len(),
                    config.max_files_in_zip
                )));
            }
            let member = pick_report_member(&mut archive);
            let index = match member {
                Some(i) => i,
                None => return Ok(None),
            };
            let mut file = archive.by_index(index)?;
            let compressed = file.compressed_size();
            let uncompressed = file.size();
            if compressed > 0 {
                let ratio = uncompressed as f64 / compressed as f64;
                if ratio > config.max_compression_ratio {
                    return Err(RuaError::FileTooLarge(format!(
                        "suspicious compression ratio: {:.2}",
                        ratio
                    )));
                }
            }
            if uncompressed > config.max_decompressed_size as u64 {
                return Err(RuaError::FileTooLarge("decompressed zip member too large".into()));
            }
            let mut contents = String::with_capacity(uncompressed as usize);
            file.read_to_string(&mut contents)?;
            Ok(Some(contents))
        }
        Compression::None => {
            let contents = String::from_utf8_lossy(bytes).into_owned();
            Ok(Some(contents))
        }
    }
}

/// First `.xml` member wins; a single-member archive is accepted regardless of
/// its name. Everything else (empty archive, multi-member with no xml) yields
/// no member.
fn pick_report_member(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Option<usize> {
    for i in 0..archive.len() {
        if let Ok(file) = archive.by_index(i) {
            if file.name().to_lowercase().ends_with(".xml") {
                return Some(i);
            }
        }
    }
    if archive.len() == 1 {
        Some(0)
    } else {
        None
    }
}
