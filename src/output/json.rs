use crate::model::{CheckResult, ScannedFile, SeveritySummary, VulnerabilityReport};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    summary: JsonSummary,
    vulnerabilities: &'a [VulnerabilityReport],
    scanned_files: &'a [ScannedFile],
    scan_time: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonSummary {
    total_dependencies: usize,
    vulnerable_packages: usize,
    percentage_vulnerable: f64,
    vulnerabilities_found: usize,
    by_severity: SeveritySummary,
}

impl<'a> From<&'a CheckResult> for JsonReport<'a> {
    fn from(result: &'a CheckResult) -> Self {
        Self {
            summary: JsonSummary {
                total_dependencies: result.total_dependencies,
                vulnerable_packages: result.vulnerable_packages,
                percentage_vulnerable: result.percentage_vulnerable,
                vulnerabilities_found: result.vulnerabilities_found,
                by_severity: result.summary,
            },
            vulnerabilities: &result.vulnerabilities,
            scanned_files: &result.scanned_files,
            scan_time: result.scan_time,
        }
    }
}

pub fn render_json(result: &CheckResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(&JsonReport::from(result))?)
}

pub fn print_json(result: &CheckResult) -> Result<()> {
    println!("{}", render_json(result)?);
    Ok(())
}
