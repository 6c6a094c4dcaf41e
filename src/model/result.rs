use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{ManifestKind, Severity, VulnerabilityReport};

/// Finding counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub critical: usize,
    pub high: usize,
    pub moderate: usize,
    pub low: usize,
    pub unknown: usize,
}

impl SeveritySummary {
    pub fn from_reports(reports: &[VulnerabilityReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            match report.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Moderate => summary.moderate += 1,
                Severity::Low => summary.low += 1,
                Severity::Unknown => summary.unknown += 1,
            }
        }
        summary
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Moderate => self.moderate,
            Severity::Low => self.low,
            Severity::Unknown => self.unknown,
        }
    }

    /// Highest severity with at least one finding.
    pub fn highest(&self) -> Option<Severity> {
        Severity::DESCENDING
            .into_iter()
            .find(|severity| self.count(*severity) > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedFile {
    pub path: PathBuf,
    pub kind: ManifestKind,
    pub dependency_count: usize,
}

/// The reconciled, filtered and ordered output of one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub total_dependencies: usize,
    pub vulnerable_packages: usize,
    pub percentage_vulnerable: f64,
    pub vulnerabilities_found: usize,
    /// Ordered by severity (highest first), then package name.
    pub vulnerabilities: Vec<VulnerabilityReport>,
    pub summary: SeveritySummary,
    pub scanned_files: Vec<ScannedFile>,
    /// Provider queries that failed and contributed no findings.
    pub failed_queries: usize,
    pub scan_time: DateTime<Utc>,
}

impl CheckResult {
    pub fn fixable_count(&self) -> usize {
        self.vulnerabilities
            .iter()
            .filter(|v| v.suggested_upgrade.is_some())
            .count()
    }
}
