//! The OSV advisory schema, shared by OSV.dev query responses and the PyPA
//! advisory database files, plus the normalization helpers every source uses.

use serde::{Deserialize, Deserializer};

use super::severity::{parse_cvss_score, severity_from_label};
use crate::model::Severity;

/// Link prefixes of registries whose advisory pages are sorted first.
const CANONICAL_ADVISORY_HOSTS: &[&str] = &[
    "https://github.com/advisories/",
    "https://osv.dev/vulnerability/",
];

pub(crate) const NO_DESCRIPTION: &str = "No description available";

#[derive(Debug, Deserialize)]
pub(crate) struct OsvRecord {
    pub id: String,
    pub summary: Option<String>,
    pub details: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub severity: Vec<OsvSeverity>,
    #[serde(default)]
    pub affected: Vec<OsvAffected>,
    #[serde(default)]
    pub references: Vec<OsvReference>,
    pub database_specific: Option<DatabaseSpecific>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsvSeverity {
    #[serde(rename = "type")]
    pub kind: String,
    pub score: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsvAffected {
    #[serde(default)]
    pub ranges: Vec<OsvRange>,
    #[serde(default, deserialize_with = "version_list")]
    pub versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsvRange {
    #[serde(default)]
    pub events: Vec<OsvEvent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsvEvent {
    #[serde(default, deserialize_with = "optional_version")]
    pub fixed: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsvReference {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DatabaseSpecific {
    pub severity: Option<String>,
}

/// A version as written in an advisory file. Unquoted YAML versions such as
/// `1.0` arrive as numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum VersionLiteral {
    Text(String),
    Integer(u64),
    Float(f64),
}

impl From<VersionLiteral> for String {
    fn from(literal: VersionLiteral) -> Self {
        match literal {
            VersionLiteral::Text(text) => text,
            VersionLiteral::Integer(n) => n.to_string(),
            VersionLiteral::Float(f) => format!("{:?}", f),
        }
    }
}

fn version_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let literals = Vec::<VersionLiteral>::deserialize(deserializer)?;
    Ok(literals.into_iter().map(String::from).collect())
}

fn optional_version<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let literal = Option::<VersionLiteral>::deserialize(deserializer)?;
    Ok(literal.map(String::from))
}

impl OsvRecord {
    /// CVE identifiers from the record ID and its aliases.
    pub fn cve_ids(&self) -> Vec<String> {
        std::iter::once(&self.id)
            .chain(self.aliases.iter())
            .filter(|id| id.starts_with("CVE-"))
            .cloned()
            .collect()
    }

    /// The first `CVSS_V3` score, else the database's textual tier, else
    /// [`Severity::Unknown`].
    pub fn severity(&self) -> Severity {
        let cvss = self
            .severity
            .iter()
            .filter(|s| s.kind == "CVSS_V3")
            .find_map(|s| parse_cvss_score(&s.score));
        if let Some(severity) = cvss {
            return severity;
        }

        self.database_specific
            .as_ref()
            .and_then(|db| db.severity.as_deref())
            .map(severity_from_label)
            .unwrap_or(Severity::Unknown)
    }

    /// Every `fixed` event, in the order the record lists them.
    pub fn fixed_versions(&self) -> Vec<String> {
        let mut fixed: Vec<String> = Vec::new();
        let events = self
            .affected
            .iter()
            .flat_map(|a| a.ranges.iter())
            .flat_map(|r| r.events.iter());
        for version in events.filter_map(|e| e.fixed.as_ref()) {
            if !fixed.contains(version) {
                fixed.push(version.clone());
            }
        }
        fixed
    }

    /// Whether the record applies to `version`.
    ///
    /// An explicit version list is tested by exact string equality. An entry
    /// that only declares ranges counts as affected: ranges are not evaluated.
    pub fn affects(&self, version: &str) -> bool {
        self.affected.iter().any(|affected| {
            if !affected.versions.is_empty() {
                affected.versions.iter().any(|v| v == version)
            } else {
                !affected.ranges.is_empty()
            }
        })
    }

    pub fn description(&self) -> String {
        [self.summary.as_deref(), self.details.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .unwrap_or(NO_DESCRIPTION)
            .to_string()
    }

    /// Reference URLs, optionally restricted to `ADVISORY` references.
    pub fn reference_urls(&self, advisories_only: bool) -> Vec<String> {
        self.references
            .iter()
            .filter(|r| !advisories_only || r.kind == "ADVISORY")
            .map(|r| r.url.clone())
            .collect()
    }
}

fn is_canonical(link: &str) -> bool {
    CANONICAL_ADVISORY_HOSTS
        .iter()
        .any(|host| link.starts_with(host))
}

/// Moves canonical registry links to the front and drops duplicates.
/// Relative order is otherwise preserved.
pub fn prioritize_links(links: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(links.len());
    for link in links {
        if !unique.contains(&link) {
            unique.push(link);
        }
    }

    let (mut canonical, other): (Vec<String>, Vec<String>) =
        unique.into_iter().partition(|link| is_canonical(link));
    canonical.extend(other);
    canonical
}
