use std::collections::HashSet;

use crate::config::IgnoreRules;
use crate::model::{SeveritySummary, VulnerabilityReport};

/// Drops every report the ignore rules suppress.
pub fn apply_ignore_rules(
    reports: Vec<VulnerabilityReport>,
    rules: &IgnoreRules,
) -> Vec<VulnerabilityReport> {
    if rules.is_empty() {
        return reports;
    }
    reports
        .into_iter()
        .filter(|report| !rules.matches(report))
        .collect()
}

/// Sorts by severity, highest first, then by package name. Stable.
pub fn order_reports(reports: &mut [VulnerabilityReport]) {
    reports.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.package.cmp(&b.package))
    });
}

/// Aggregate figures for a set of surviving reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub vulnerable_packages: usize,
    pub percentage_vulnerable: f64,
    pub vulnerabilities_found: usize,
    pub by_severity: SeveritySummary,
}

impl Statistics {
    /// `total_dependencies` must be non-zero.
    pub fn compute(reports: &[VulnerabilityReport], total_dependencies: usize) -> Self {
        let vulnerable_packages = reports
            .iter()
            .map(VulnerabilityReport::key)
            .collect::<HashSet<_>>()
            .len();

        Self {
            vulnerable_packages,
            percentage_vulnerable: vulnerable_packages as f64 / total_dependencies as f64 * 100.0,
            vulnerabilities_found: reports.len(),
            by_severity: SeveritySummary::from_reports(reports),
        }
    }
}
