//! Report renderers: text table, JSON envelope, CSV.
//!
//! Renderers list only reachable ports (`NoConn` rows hidden) unless
//! `show_all` is set. The report itself always holds every scanned port.
use std::io::{self, Write};

use serde::Serialize;

use crate::types::{PortType, ScanReport, ScanResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// Render `report` in `format` to `w`.
pub fn write_report<W: Write>(
    w: W,
    report: &ScanReport,
    format: OutputFormat,
    show_all: bool,
) -> io::Result<()> {
    let rows: Vec<&ScanResult> = report
        .results
        .iter()
        .filter(|r| show_all || r.port_type != PortType::NoConn)
        .collect();
    match format {
        OutputFormat::Text => write_text(w, report, &rows),
        OutputFormat::Json => write_json(w, report, &rows),
        OutputFormat::Csv => write_csv(w, &rows),
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn elapsed_str(report: &ScanReport) -> String {
    format!("{:.3}s", report.elapsed.as_secs_f64())
}

fn write_text<W: Write>(mut w: W, report: &ScanReport, rows: &[&ScanResult]) -> io::Result<()> {
    writeln!(
        w,
        "\nScan of {} completed in {} ({} of {} ports scanned)",
        report.host,
        elapsed_str(report),
        report.scanned_done,
        report.scanned_total
    )?;
    writeln!(
        w,
        "Recognized: {} (post-quantum capable: {})\n",
        report.recognized_count, report.pq_capable_count
    )?;
    if rows.is_empty() {
        writeln!(w, "No reachable ports found.")?;
        return Ok(());
    }

    const HEADERS: [&str; 10] = [
        "host", "port", "type", "pq", "non-pq", "tls", "cipher", "group", "key", "error",
    ];
    let cells: Vec<[String; 10]> = rows
        .iter()
        .map(|r| {
            let key = r
                .server_cert_key_algorithm
                .as_deref()
                .or(r.ssh_host_key_algorithm.as_deref())
                .unwrap_or("");
            let mut error = r.error.clone().unwrap_or_default();
            if error.len() > 60 {
                let mut cut = 60;
                while !error.is_char_boundary(cut) {
                    cut -= 1;
                }
                error.truncate(cut);
            }
            [
                r.address().to_string(),
                r.port().to_string(),
                r.port_type.to_string(),
                yes_no(r.pq_kex_supported).to_string(),
                yes_no(r.non_pq_kex_supported).to_string(),
                r.tls_version.clone().unwrap_or_default(),
                r.cipher_suite.clone().unwrap_or_default(),
                r.curve_name.clone().unwrap_or_default(),
                key.to_string(),
                error,
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |out_w: &mut W, row: &[&str]| -> io::Result<()> {
        let mut out = String::new();
        for (i, (cell, width)) in row.iter().zip(widths.iter()).enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            if i == 1 {
                out.push_str(&format!("{cell:>width$}"));
            } else {
                out.push_str(&format!("{cell:<width$}"));
            }
        }
        writeln!(out_w, "{}", out.trim_end())
    };

    line(&mut w, &HEADERS[..])?;
    let dashes: Vec<String> = widths.iter().map(|n| "-".repeat(*n)).collect();
    line(&mut w, &dashes.iter().map(String::as_str).collect::<Vec<_>>())?;
    for row in &cells {
        line(&mut w, &row.iter().map(String::as_str).collect::<Vec<_>>())?;
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonEnvelope<'a> {
    host: &'a str,
    scan_time: &'a str,
    elapsed_time: String,
    scanned: u64,
    recognized: u64,
    pq_capable: u64,
    results: &'a [&'a ScanResult],
}

fn write_json<W: Write>(mut w: W, report: &ScanReport, rows: &[&ScanResult]) -> io::Result<()> {
    let envelope = JsonEnvelope {
        host: &report.host,
        scan_time: &report.started_at,
        elapsed_time: elapsed_str(report),
        scanned: report.scanned_done,
        recognized: report.recognized_count,
        pq_capable: report.pq_capable_count,
        results: rows,
    };
    serde_json::to_writer_pretty(&mut w, &envelope)?;
    writeln!(w)
}

#[derive(Serialize)]
struct CsvRow<'a> {
    host: &'a str,
    port: u16,
    port_type: &'a str,
    pq_kex: bool,
    non_pq_kex: bool,
    tls_version: Option<&'a str>,
    cipher_suite: Option<&'a str>,
    group: Option<&'a str>,
    server_cert_key_algo: Option<&'a str>,
    ssh_host_key_algo: Option<&'a str>,
    error: Option<&'a str>,
    test_duration_ms: u64,
}

fn write_csv<W: Write>(w: W, rows: &[&ScanResult]) -> io::Result<()> {
    let mut writer = csv::Writer::from_writer(w);
    for r in rows {
        writer.serialize(CsvRow {
            host: r.address(),
            port: r.port(),
            port_type: r.port_type.as_str(),
            pq_kex: r.pq_kex_supported,
            non_pq_kex: r.non_pq_kex_supported,
            tls_version: r.tls_version.as_deref(),
            cipher_suite: r.cipher_suite.as_deref(),
            group: r.curve_name.as_deref(),
            server_cert_key_algo: r.server_cert_key_algorithm.as_deref(),
            ssh_host_key_algo: r.ssh_host_key_algorithm.as_deref(),
            error: r.error.as_deref(),
            test_duration_ms: r.test_duration.as_millis() as u64,
        })?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScanTarget;
    use std::time::Duration;

    fn report() -> ScanReport {
        let mut tls = ScanResult::unrecognized(
            &ScanTarget::new("127.0.0.1", 443),
            PortType::Tls,
            "",
            Duration::from_millis(8),
        );
        tls.error = None;
        tls.pq_kex_supported = true;
        tls.tls_version = Some("TLS 1.3".into());
        tls.cipher_suite = Some("TLS13_AES_128_GCM_SHA256".into());
        tls.curve_name = Some("X25519MLKEM768".into());
        let closed = ScanResult::unrecognized(
            &ScanTarget::new("127.0.0.1", 444),
            PortType::NoConn,
            "TLS: connect 127.0.0.1:444: Connection refused, \"quoted\"",
            Duration::from_millis(1),
        );
        ScanReport {
            host: "127.0.0.1".into(),
            scanned_total: 2,
            scanned_done: 2,
            recognized_count: 1,
            pq_capable_count: 1,
            started_at: "2024-01-01T00:00:00Z".into(),
            finished_at: "2024-01-01T00:00:01Z".into(),
            elapsed: Duration::from_millis(1500),
            results: vec![tls, closed],
        }
    }

    fn render(format: OutputFormat, show_all: bool) -> String {
        let mut buf = Vec::new();
        write_report(&mut buf, &report(), format, show_all).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn text_hides_noconn_by_default() {
        let out = render(OutputFormat::Text, false);
        assert!(out.contains("completed in 1.500s"));
        assert!(out.contains("X25519MLKEM768"));
        assert!(!out.contains("444"));
        assert!(render(OutputFormat::Text, true).contains("NoConn"));
    }

    #[test]
    fn json_envelope() {
        let v: serde_json::Value = serde_json::from_str(&render(OutputFormat::Json, true)).unwrap();
        assert_eq!(v["scanTime"], "2024-01-01T00:00:00Z");
        assert_eq!(v["elapsedTime"], "1.500s");
        assert_eq!(v["recognized"], 1);
        assert_eq!(v["results"].as_array().unwrap().len(), 2);
        assert_eq!(v["results"][0]["portType"], "TLS");
        assert_eq!(v["results"][0]["ecCurve"], "X25519MLKEM768");
        assert_eq!(v["results"][0]["isPQKexSupported"], true);
    }

    #[test]
    fn csv_escapes_fields() {
        let out = render(OutputFormat::Csv, true);
        let mut lines = out.lines();
        assert!(lines.next().unwrap().starts_with("host,port,port_type,pq_kex,non_pq_kex"));
        assert!(lines.next().unwrap().starts_with("127.0.0.1,443,TLS,true,false,TLS 1.3"));
        let closed = lines.next().unwrap();
        assert!(closed.contains("\"TLS: connect 127.0.0.1:444: Connection refused, \"\"quoted\"\"\""));
    }
}
