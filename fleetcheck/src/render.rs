//! Report and plan presentation.

use crate::OutputFormat;
use anyhow::Result;
use fleetcheck_core::{Plan, Report, ReportEntry, Summary, Verdict};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::Write;

#[derive(Serialize)]
struct JsonReport<'a> {
    started_at: &'a str,
    finished_at: &'a str,
    passing: bool,
    cancelled: bool,
    pairs_total: usize,
    pairs_without_entries: usize,
    summary: Summary,
    entries: Vec<&'a ReportEntry>,
}

pub fn write_report<W: Write>(w: &mut W, report: &Report, format: OutputFormat, failures_only: bool) -> Result<()> {
    let entries: Vec<&ReportEntry> = report.entries.iter().filter(|e| !failures_only || e.is_failure()).collect();
    match format {
        OutputFormat::Text => {
            for e in &entries {
                writeln!(w, "{}", text_line(e))?;
            }
            writeln!(w, "{}", summary_line(report))?;
        }
        OutputFormat::Json => {
            let doc = JsonReport {
                started_at: &report.started_at,
                finished_at: &report.finished_at,
                passing: report.is_passing(),
                cancelled: report.cancelled,
                pairs_total: report.pairs_total,
                pairs_without_entries: report.pairs_without_entries,
                summary: report.summary(),
                entries,
            };
            serde_json::to_writer_pretty(&mut *w, &doc)?;
            writeln!(w)?;
        }
        OutputFormat::Jsonl => {
            for e in entries {
                writeln!(w, "{}", serde_json::to_string(e)?)?;
            }
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(&mut *w);
            wtr.write_record(["suite", "host", "endpoint", "transport", "expectation", "status", "kind", "detail"])?;
            for e in entries {
                let (status, kind, detail) = match &e.verdict {
                    Verdict::Pass => ("pass", String::new(), ""),
                    Verdict::Fail { kind, detail } => ("fail", kind.to_string(), detail.as_str()),
                };
                wtr.write_record([
                    e.suite.as_str(),
                    e.host.as_str(),
                    e.endpoint.as_str(),
                    e.transport.as_str(),
                    e.expectation.as_str(),
                    status,
                    kind.as_str(),
                    detail,
                ])?;
            }
            wtr.flush()?;
        }
    }
    Ok(())
}

fn text_line(e: &ReportEntry) -> String {
    match &e.verdict {
        Verdict::Pass => format!("ok    [{}] {} {}: {}", e.suite, e.host, e.endpoint, e.expectation),
        Verdict::Fail { kind, detail } => {
            format!("FAIL  [{}] {} {}: {} ({}): {}", e.suite, e.host, e.endpoint, e.expectation, kind, detail)
        }
    }
}

fn summary_line(report: &Report) -> String {
    let s = report.summary();
    let mut line = format!(
        "{} checks: {} passed, {} failed (transport {}, protocol {}, violation {})",
        s.total,
        s.passed,
        s.failed(),
        s.transport,
        s.protocol,
        s.violations
    );
    if report.cancelled {
        let _ = write!(
            line,
            "; run cancelled, {} of {} probes produced no result",
            report.pairs_without_entries, report.pairs_total
        );
    }
    line
}

/// Human-readable listing of what a run would check.
pub fn outline(plan: &Plan) -> String {
    let mut out = String::new();
    for suite in &plan.suites {
        let hosts: Vec<&str> = suite.hosts.iter().map(|h| h.as_str()).collect();
        let _ = writeln!(out, "{} ({})", suite.name, hosts.join(", "));
        for spec in &suite.endpoints {
            let req = &spec.request;
            let port = req.port.map(|p| format!(":{}", p)).unwrap_or_default();
            let scheme = if req.secure { "tls" } else { "plain" };
            let _ = writeln!(out, "  {} [{} {}{} /{}]", spec.name, req.transport, scheme, port, req.path);
            for e in &spec.expectations {
                let _ = writeln!(out, "    - {}", e.label());
            }
        }
    }
    out
}
