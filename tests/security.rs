/// Security tests for ruascope.
///
/// This module verifies that the analyzer is protected against common attacks:
/// - ZIP bombs (by enforcing decompression, ratio and member count limits)
/// - XML External Entity (XXE) injection
/// - Billion Laughs (recursive XML entity) attacks
use std::io::{Cursor, Write};
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use zip::write::SimpleFileOptions;

use ruascope::classifier::BUILTIN_DB;
use ruascope::config::Config;
use ruascope::diag::Severity;
use ruascope::pipeline::run_pipeline;
use ruascope::xml_parser::parse_report;

const MAX_PROCESSING_TIME_MS: u128 = 2000;
const TEST_BOMB_SIZE: usize = 2 * 1024 * 1024; // 2MB decompressed

fn mbox_with_attachment(filename: &str, mimetype: &str, payload: &[u8]) -> Vec<u8> {
    format!(
        "From attacker@example.net Thu Aug 28 12:00:00 2026\n\
         From: attacker@example.net\n\
         Subject: Report\n\
         MIME-Version: 1.0\n\
         Content-Type: multipart/mixed; boundary=\"B\"\n\
         \n\
         --B\n\
         Content-Type: {mime}; name=\"{name}\"\n\
         Content-Disposition: attachment; filename=\"{name}\"\n\
         Content-Transfer-Encoding: base64\n\
         \n\
         {body}\n\
         --B--\n",
        mime = mimetype,
        name = filename,
        body = STANDARD.encode(payload),
    )
    .into_bytes()
}

/// A zip bomb attachment is skipped within the time budget, and the batch
/// still succeeds with an empty summary.
#[test]
fn test_zip_bomb_protection() {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    zip.start_file("large.xml", options).unwrap();
    zip.write_all("A".repeat(TEST_BOMB_SIZE).as_bytes()).unwrap();
    let bomb = zip.finish().unwrap().into_inner();

    let mbox = mbox_with_attachment("report.zip", "application/zip", &bomb);
    let config = Config {
        max_decompressed_size: 1024 * 1024, // 1MB, below the bomb payload
        ..Config::default()
    };

    let start = Instant::now();
    let out = run_pipeline(&mbox, None, &config, &BUILTIN_DB).unwrap();
    let duration = start.elapsed();
    assert!(
        duration.as_millis() < MAX_PROCESSING_TIME_MS,
        "zip bomb processing too slow: {:?}",
        duration
    );
    assert_eq!(out.summary.report_count, 0);
    assert_eq!(out.parsed_reports, 0);
    assert_eq!(out.diagnostics.len(), 1);
    assert_eq!(out.diagnostics[0].severity, Severity::Skip);
    assert!(
        out.diagnostics[0].message.contains("too large")
            || out.diagnostics[0].message.contains("compression ratio"),
        "unexpected diagnostic: {}",
        out.diagnostics[0].message
    );
}

/// A zip with far too many members is rejected by the member count ceiling.
#[test]
fn test_zip_member_count_limit() {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for i in 0..20 {
        zip.start_file(format!("member{}.txt", i), options).unwrap();
        zip.write_all(b"x").unwrap();
    }
    let many = zip.finish().unwrap().into_inner();

    let mbox = mbox_with_attachment("report.zip", "application/zip", &many);
    let config = Config { max_files_in_zip: 10, ..Config::default() };
    let out = run_pipeline(&mbox, None, &config, &BUILTIN_DB).unwrap();
    assert_eq!(out.summary.report_count, 0);
    assert_eq!(out.diagnostics.len(), 1);
    assert!(out.diagnostics[0].message.contains("members in archive"));
}

/// Test protection against XXE (XML External Entity Injection).
#[test]
fn test_xxe_protection() {
    let xml = r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <!DOCTYPE foo [
        <!ENTITY xxe SYSTEM "file:///etc/passwd">
    ]>
    <feedback>
        <report_metadata>
            <date_range><begin>100</begin><end>200</end></date_range>
        </report_metadata>
        <record>
            <row><source_ip>1.2.3.4</source_ip><count>1</count></row>
        </record>
    </feedback>
    "#;
    let mut diags = Vec::new();
    let result = parse_report(xml, &Config::default(), &mut diags);
    assert!(result.is_ok(), "parser should handle malicious XML safely");
    for record in result.unwrap().records {
        assert!(
            !record.source_ip.contains("/etc/passwd"),
            "XXE allowed system file read"
        );
    }
}

/// Test protection against the Billion Laughs attack (recursive XML entities).
#[test]
fn test_billion_laughs_protection() {
    let xml = r#"
    <?xml version="1.0"?>
    <!DOCTYPE lolz [
        <!ENTITY lol "lol">
        <!ENTITY lol2 "&lol;&lol;">
        <!ENTITY lol3 "&lol2;&lol2;">
        <!ENTITY lol4 "&lol3;&lol3;">
        <!ENTITY lol5 "&lol4;&lol4;">
        <!ENTITY lol6 "&lol5;&lol5;">
        <!ENTITY lol7 "&lol6;&lol6;">
        <!ENTITY lol8 "&lol7;&lol7;">
        <!ENTITY lol9 "&lol8;&lol8;">
    ]>
    <feedback>
        <report_metadata>
            <date_range><begin>100</begin><end>200</end></date_range>
        </report_metadata>
    </feedback>
    "#;
    let start = Instant::now();
    let mut diags = Vec::new();
    let result = parse_report(xml, &Config::default(), &mut diags);
    let duration = start.elapsed();
    assert!(
        duration.as_millis() < MAX_PROCESSING_TIME_MS,
        "Billion Laughs was not blocked in time"
    );
    assert!(result.is_err(), "parser should reject recursive entities");
}

/// Deeply nested XML hits the recursion depth limit instead of exhausting the
/// stack or the heap.
#[test]
fn test_recursion_depth_limit() {
    let mut xml = String::from("<feedback>");
    for _ in 0..64 {
        xml.push_str("<nested>");
    }
    for _ in 0..64 {
        xml.push_str("</nested>");
    }
    xml.push_str("</feedback>");
    let mut diags = Vec::new();
    let result = parse_report(&xml, &Config::default(), &mut diags);
    assert!(result.is_err());
}
