use crate::model::{CheckResult, Ecosystem, Severity, VulnerabilityReport};
use anyhow::Result;
use std::collections::BTreeMap;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct VulnRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "CVE")]
    cve: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Fixed In")]
    fixed_in: String,
}

pub fn print_cli_table(result: &CheckResult) -> Result<()> {
    println!("{}", render_table(result));
    Ok(())
}

/// Renders scanned files, the summary, the findings table and remediation
/// commands.
pub fn render_table(result: &CheckResult) -> String {
    let mut lines = vec![
        String::new(),
        format!(
            "Scan completed at: {}",
            result.scan_time.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        String::new(),
    ];

    if !result.scanned_files.is_empty() {
        lines.push("Scanned files:".to_string());
        for file in &result.scanned_files {
            lines.push(format!(
                "  {} ({}, {} dependencies)",
                file.path.display(),
                file.kind,
                file.dependency_count
            ));
        }
        lines.push(String::new());
    }

    lines.extend(summary_lines(result));

    if result.vulnerabilities.is_empty() {
        lines.push(String::new());
        lines.push("No vulnerabilities found.".to_string());
        return lines.join("\n");
    }

    lines.push(String::new());
    lines.push(format!(
        "Found {} vulnerabilities:",
        result.vulnerabilities_found
    ));
    lines.push(String::new());

    let rows: Vec<VulnRow> = result
        .vulnerabilities
        .iter()
        .map(|v| VulnRow {
            severity: format_severity(&v.severity),
            package: truncate(&v.package, 40),
            version: v.version.clone(),
            cve: if v.cve_ids.is_empty() {
                "-".to_string()
            } else {
                v.cve_ids.iter().cloned().collect::<Vec<_>>().join(", ")
            },
            description: truncate(&v.description, 50),
            source: v.source.to_string(),
            fixed_in: v.suggested_upgrade.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    lines.push(Table::new(rows).with(Style::rounded()).to_string());

    lines.extend(remediation_lines(result));
    lines.join("\n")
}

fn summary_lines(result: &CheckResult) -> Vec<String> {
    let summary = &result.summary;
    let mut breakdown = format!(
        "{} critical, {} high, {} moderate, {} low",
        summary.critical, summary.high, summary.moderate, summary.low
    );
    if summary.unknown > 0 {
        breakdown.push_str(&format!(", {} unknown", summary.unknown));
    }

    let mut lines = vec![
        "Summary:".to_string(),
        format!("  Total dependencies: {}", result.total_dependencies),
        format!(
            "  Vulnerable packages: {} ({:.1}%)",
            result.vulnerable_packages, result.percentage_vulnerable
        ),
        format!("  Vulnerabilities found: {}", result.vulnerabilities_found),
    ];
    if result.vulnerabilities_found > 0 {
        lines.push(format!("  By severity: {}", breakdown));
    }
    lines
}

/// `N out of M have fixes` plus one install command per fixable package.
fn remediation_lines(result: &CheckResult) -> Vec<String> {
    let fixable = result.fixable_count();
    let mut lines = vec![
        String::new(),
        format!(
            "{} out of {} vulnerabilities have fixes available",
            fixable, result.vulnerabilities_found
        ),
    ];
    if fixable == 0 {
        return lines;
    }

    // Reports are ordered by severity, so the first fix seen for a package
    // comes from its most severe finding.
    let mut commands: BTreeMap<String, String> = BTreeMap::new();
    for report in &result.vulnerabilities {
        if let Some(command) = install_command(report) {
            commands.entry(report.package.clone()).or_insert(command);
        }
    }

    if !commands.is_empty() {
        lines.push(String::new());
        lines.push("Upgrade commands:".to_string());
        lines.extend(commands.into_values().map(|c| format!("  {}", c)));
    }
    lines
}

fn install_command(report: &VulnerabilityReport) -> Option<String> {
    let fix = report.suggested_upgrade.as_deref()?;
    match report.ecosystem? {
        Ecosystem::Npm => Some(format!("npm install {}@{}", report.package, fix)),
        Ecosystem::PyPI => Some(format!("pip install {}=={}", report.package, fix)),
    }
}

fn format_severity(severity: &Severity) -> String {
    match severity {
        Severity::Critical => "\x1b[31mCRITICAL\x1b[0m".to_string(),
        Severity::High => "\x1b[91mHIGH\x1b[0m".to_string(),
        Severity::Moderate => "\x1b[33mMODERATE\x1b[0m".to_string(),
        Severity::Low => "\x1b[32mLOW\x1b[0m".to_string(),
        Severity::Unknown => "UNKNOWN".to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdvisorySource, ManifestKind, ScannedFile, SeveritySummary};
    use chrono::Utc;

    fn result(vulnerabilities: Vec<VulnerabilityReport>, total: usize) -> CheckResult {
        CheckResult {
            total_dependencies: total,
            vulnerable_packages: vulnerabilities.len(),
            percentage_vulnerable: vulnerabilities.len() as f64 / total as f64 * 100.0,
            vulnerabilities_found: vulnerabilities.len(),
            summary: SeveritySummary::from_reports(&vulnerabilities),
            vulnerabilities,
            scanned_files: vec![ScannedFile {
                path: "package-lock.json".into(),
                kind: ManifestKind::PackageLock,
                dependency_count: total,
            }],
            failed_queries: 0,
            scan_time: Utc::now(),
        }
    }

    #[test]
    fn test_render_clean_result() {
        let output = render_table(&result(Vec::new(), 3));
        assert!(output.contains("Total dependencies: 3"));
        assert!(output.contains("Vulnerable packages: 0 (0.0%)"));
        assert!(output.contains("No vulnerabilities found."));
        assert!(output.contains("package-lock.json (package-lock.json, 3 dependencies)"));
    }

    #[test]
    fn test_render_findings_with_remediation() {
        let lodash = VulnerabilityReport::new(
            "lodash",
            "4.17.15",
            Severity::Critical,
            AdvisorySource::Osv,
        )
        .with_cves(["CVE-2020-8203"])
        .with_fixed_versions(vec!["4.17.19".into()])
        .in_ecosystem(Ecosystem::Npm);
        let requests =
            VulnerabilityReport::new("requests", "2.19.0", Severity::Unknown, AdvisorySource::Pypi)
                .with_fixed_versions(vec!["2.20.0".into()])
                .in_ecosystem(Ecosystem::PyPI);
        let minimist =
            VulnerabilityReport::new("minimist", "0.0.8", Severity::Low, AdvisorySource::NpmRegistry);

        let output = render_table(&result(vec![lodash, requests, minimist], 3));

        assert!(output.contains("Vulnerable packages: 3 (100.0%)"));
        assert!(output.contains("1 unknown"));
        assert!(output.contains("CVE-2020-8203"));
        assert!(output.contains("2 out of 3 vulnerabilities have fixes available"));
        assert!(output.contains("npm install lodash@4.17.19"));
        assert!(output.contains("pip install requests==2.20.0"));
    }

    #[test]
    fn test_unknown_hidden_when_zero() {
        let report = VulnerabilityReport::new("a", "1.0.0", Severity::High, AdvisorySource::Osv);
        let output = render_table(&result(vec![report], 2));
        assert!(output.contains("0 critical, 1 high, 0 moderate, 0 low"));
        assert!(!output.contains("unknown"));
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
        assert_eq!(truncate("short", 10), "short");
    }
}
