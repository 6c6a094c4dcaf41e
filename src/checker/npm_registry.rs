use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::advisory::{prioritize_links, NO_DESCRIPTION};
use super::severity::severity_from_label;
use super::{cached_query, ClientError, QueryOutcome, SourceClient};
use crate::cache::RunContext;
use crate::model::{AdvisorySource, Dependency, Ecosystem, VulnerabilityReport};

const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";
const AUDIT_PATH: &str = "/-/npm/v1/security/audits";

/// `patched_versions` value meaning "no release fixes this".
const NO_PATCH: &str = "<0.0.0";

/// Queries the npm registry's audit endpoint, one dependency per request.
pub struct NpmRegistryClient {
    client: reqwest::Client,
    registry: String,
}

impl NpmRegistryClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_REGISTRY)
    }

    pub fn with_base_url(registry: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            registry: registry.into(),
        }
    }

    pub fn with_client(client: reqwest::Client, registry: &str) -> Self {
        Self {
            client,
            registry: registry.to_string(),
        }
    }

    async fn fetch(&self, dependency: &Dependency) -> Result<Vec<VulnerabilityReport>, ClientError> {
        let url = format!("{}{}", self.registry.trim_end_matches('/'), AUDIT_PATH);
        let payload = AuditPayload::for_dependency(dependency);

        let response = self.client.post(&url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let audit: AuditResponse = response.json().await?;
        Ok(to_reports(audit, dependency))
    }
}

impl Default for NpmRegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

/// A minimal `package-lock`-shaped tree containing a single dependency.
#[derive(Serialize)]
struct AuditPayload<'a> {
    name: &'static str,
    version: &'static str,
    requires: BTreeMap<&'a str, &'a str>,
    dependencies: BTreeMap<&'a str, AuditDependency<'a>>,
}

#[derive(Serialize)]
struct AuditDependency<'a> {
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    integrity: Option<&'a str>,
}

impl<'a> AuditPayload<'a> {
    fn for_dependency(dependency: &'a Dependency) -> Self {
        let version = dependency.query_version();
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: "1.0.0",
            requires: BTreeMap::from([(dependency.name.as_str(), version)]),
            dependencies: BTreeMap::from([(
                dependency.name.as_str(),
                AuditDependency {
                    version,
                    integrity: dependency.integrity.as_deref(),
                },
            )]),
        }
    }
}

#[derive(Deserialize)]
struct AuditResponse {
    #[serde(default)]
    advisories: BTreeMap<String, NpmAdvisory>,
}

#[derive(Deserialize)]
struct NpmAdvisory {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    title: String,
    module_name: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    url: String,
    patched_versions: Option<String>,
    #[serde(default)]
    cves: Vec<String>,
}

fn to_reports(audit: AuditResponse, dependency: &Dependency) -> Vec<VulnerabilityReport> {
    let mut advisories: Vec<NpmAdvisory> = audit
        .advisories
        .into_values()
        .filter(|advisory| advisory.module_name == dependency.name)
        .collect();
    advisories.sort_by_key(|advisory| advisory.id);

    advisories
        .into_iter()
        .map(|advisory| {
            let fixed: Vec<String> = advisory
                .patched_versions
                .as_deref()
                .and_then(first_patched_version)
                .into_iter()
                .collect();
            let links = if advisory.url.is_empty() {
                Vec::new()
            } else {
                vec![advisory.url]
            };
            let description = if advisory.title.trim().is_empty() {
                NO_DESCRIPTION.to_string()
            } else {
                advisory.title
            };

            VulnerabilityReport::new(
                &dependency.name,
                &dependency.version,
                severity_from_label(&advisory.severity),
                AdvisorySource::NpmRegistry,
            )
            .with_description(description)
            .with_cves(advisory.cves)
            .with_links(prioritize_links(links))
            .with_fixed_versions(fixed)
        })
        .collect()
}

/// Extracts the first concrete version from a range such as `>=4.17.19`.
fn first_patched_version(patched: &str) -> Option<String> {
    if patched.trim() == NO_PATCH {
        return None;
    }

    patched
        .split(|c: char| c.is_whitespace() || c == '|' || c == ',')
        .map(|token| token.trim_start_matches(|c: char| matches!(c, '>' | '<' | '=' | '^' | '~' | 'v')))
        .find_map(|token| semver::Version::parse(token).ok())
        .map(|version| version.to_string())
}

#[async_trait]
impl SourceClient for NpmRegistryClient {
    fn source(&self) -> AdvisorySource {
        AdvisorySource::NpmRegistry
    }

    fn supports(&self, ecosystem: Ecosystem) -> bool {
        ecosystem == Ecosystem::Npm
    }

    async fn query(
        &self,
        dependency: &Dependency,
        ecosystem: Ecosystem,
        ctx: &RunContext,
    ) -> QueryOutcome {
        cached_query(
            ctx,
            self.source(),
            ecosystem,
            dependency,
            self.fetch(dependency),
        )
        .await
    }
}
