use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::Ecosystem;

/// Canonical risk tier. Declaration order is the severity order, so
/// `Severity::Critical > Severity::Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Unknown,
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    /// All severities, highest first.
    pub const DESCENDING: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Moderate,
        Severity::Low,
        Severity::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Moderate => "MODERATE",
            Severity::Low => "LOW",
            Severity::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CRITICAL" => Ok(Severity::Critical),
            "HIGH" => Ok(Severity::High),
            "MODERATE" => Ok(Severity::Moderate),
            "LOW" => Ok(Severity::Low),
            "UNKNOWN" => Ok(Severity::Unknown),
            _ => Err(format!(
                "Unknown severity: {}. Use 'LOW', 'MODERATE', 'HIGH', 'CRITICAL' or 'UNKNOWN'",
                s
            )),
        }
    }
}

/// The advisory provider a finding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvisorySource {
    Osv,
    NpmRegistry,
    Pypi,
}

impl AdvisorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvisorySource::Osv => "OSV",
            AdvisorySource::NpmRegistry => "NPM_REGISTRY",
            AdvisorySource::Pypi => "PYPI",
        }
    }
}

impl std::fmt::Display for AdvisorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One finding for one `(package, version)` from one advisory source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityReport {
    pub package: String,
    pub version: String,
    pub severity: Severity,
    pub description: String,
    pub cve_ids: BTreeSet<String>,
    pub advisory_links: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_versions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_upgrade: Option<String>,
    pub source: AdvisorySource,
    /// Ecosystem the dependency was queried in, set by the engine.
    #[serde(skip)]
    pub ecosystem: Option<Ecosystem>,
}

impl VulnerabilityReport {
    pub fn new(
        package: impl Into<String>,
        version: impl Into<String>,
        severity: Severity,
        source: AdvisorySource,
    ) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            severity,
            description: String::new(),
            cve_ids: BTreeSet::new(),
            advisory_links: Vec::new(),
            fixed_versions: None,
            suggested_upgrade: None,
            source,
            ecosystem: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_cves<I, S>(mut self, cves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cve_ids.extend(cves.into_iter().map(Into::into));
        self
    }

    pub fn with_links(mut self, links: Vec<String>) -> Self {
        self.advisory_links = links;
        self
    }

    /// Records the fixed versions in provider order; the first one becomes
    /// the suggested upgrade.
    pub fn with_fixed_versions(mut self, fixed: Vec<String>) -> Self {
        self.suggested_upgrade = fixed.first().cloned();
        self.fixed_versions = if fixed.is_empty() { None } else { Some(fixed) };
        self
    }

    pub fn in_ecosystem(mut self, ecosystem: Ecosystem) -> Self {
        self.ecosystem = Some(ecosystem);
        self
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.package, &self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Moderate);
        assert!(Severity::Moderate > Severity::Low);
        assert!(Severity::Low > Severity::Unknown);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("low".parse::<Severity>(), Ok(Severity::Low));
        assert_eq!("CRITICAL".parse::<Severity>(), Ok(Severity::Critical));
        assert!("medium".parse::<Severity>().is_err());
    }

    #[test]
    fn test_report_serializes_wire_names() {
        let report = VulnerabilityReport::new("lodash", "4.17.15", Severity::High, AdvisorySource::NpmRegistry)
            .with_cves(["CVE-2020-8203"])
            .with_fixed_versions(vec!["4.17.19".to_string()]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["severity"], "HIGH");
        assert_eq!(json["source"], "NPM_REGISTRY");
        assert_eq!(json["cveIds"][0], "CVE-2020-8203");
        assert_eq!(json["suggestedUpgrade"], "4.17.19");
    }

    #[test]
    fn test_with_fixed_versions_empty() {
        let report = VulnerabilityReport::new("a", "1.0.0", Severity::Low, AdvisorySource::Osv)
            .with_fixed_versions(vec![]);
        assert!(report.fixed_versions.is_none());
        assert!(report.suggested_upgrade.is_none());
    }
}
