use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use super::advisory::{prioritize_links, OsvRecord, NO_DESCRIPTION};
use super::{cached_query, ClientError, QueryOutcome, SourceClient};
use crate::cache::RunContext;
use crate::model::{AdvisorySource, Dependency, Ecosystem, Severity, VulnerabilityReport};

const DEFAULT_PYPI: &str = "https://pypi.org/pypi";
const DEFAULT_ADVISORIES: &str =
    "https://api.github.com/repos/pypa/advisory-database/contents/vulns";
const ADVISORY_TREE: &str = "https://github.com/pypa/advisory-database/tree/main/vulns";
const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// Combines the PyPI JSON API with the PyPA advisory database.
pub struct PypiClient {
    client: reqwest::Client,
    pypi: String,
    advisories: String,
}

impl PypiClient {
    pub fn new() -> Self {
        Self::with_base_urls(DEFAULT_PYPI, DEFAULT_ADVISORIES)
    }

    pub fn with_base_urls(pypi: impl Into<String>, advisories: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            pypi: pypi.into(),
            advisories: advisories.into(),
        }
    }

    pub fn with_client(client: reqwest::Client, pypi: &str, advisories: &str) -> Self {
        Self {
            client,
            pypi: pypi.to_string(),
            advisories: advisories.to_string(),
        }
    }

    async fn fetch(&self, dependency: &Dependency) -> Result<Vec<VulnerabilityReport>, ClientError> {
        let (release, database) =
            tokio::join!(self.fetch_release(dependency), self.fetch_database(dependency));

        match (release, database) {
            (Ok(mut reports), Ok(more)) => {
                reports.extend(more);
                Ok(reports)
            }
            (Ok(reports), Err(e)) => {
                debug!("PyPA lookup failed for {}: {}", dependency.name, e);
                Ok(reports)
            }
            (Err(e), Ok(reports)) => {
                debug!("PyPI lookup failed for {}: {}", dependency.name, e);
                Ok(reports)
            }
            (Err(e), Err(_)) => Err(e),
        }
    }

    /// Vulnerabilities PyPI attaches to the release itself.
    async fn fetch_release(
        &self,
        dependency: &Dependency,
    ) -> Result<Vec<VulnerabilityReport>, ClientError> {
        let url = format!(
            "{}/{}/{}/json",
            self.pypi.trim_end_matches('/'),
            dependency.name,
            dependency.query_version()
        );

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let release: PypiRelease = response.json().await?;
        Ok(release
            .vulnerabilities
            .into_iter()
            .filter(|v| v.withdrawn.is_none())
            .map(|v| v.into_report(dependency))
            .collect())
    }

    /// Advisories from the PyPA database whose affected versions include
    /// the dependency's.
    async fn fetch_database(
        &self,
        dependency: &Dependency,
    ) -> Result<Vec<VulnerabilityReport>, ClientError> {
        let url = format!(
            "{}/{}",
            self.advisories.trim_end_matches('/'),
            dependency.name
        );

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let listing: Vec<ListingEntry> = response.json().await?;
        let mut reports = Vec::new();
        for entry in listing {
            let Some(format) = entry.advisory_format() else {
                continue;
            };
            let Some(download_url) = entry.download_url else {
                continue;
            };

            let record = match self.fetch_advisory(&download_url, format).await {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping PyPA advisory {}: {}", entry.name, e);
                    continue;
                }
            };
            if record.affects(dependency.query_version()) {
                reports.push(database_report(&record, dependency));
            }
        }

        debug!(
            "PyPA database has {} matching advisories for {}@{}",
            reports.len(),
            dependency.name,
            dependency.version
        );
        Ok(reports)
    }

    async fn fetch_advisory(
        &self,
        url: &str,
        format: AdvisoryFormat,
    ) -> Result<OsvRecord, ClientError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        parse_advisory(&body, format)
    }
}

impl Default for PypiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct PypiRelease {
    #[serde(default)]
    vulnerabilities: Vec<PypiVulnerability>,
}

#[derive(Deserialize)]
struct PypiVulnerability {
    id: String,
    summary: Option<String>,
    details: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    fixed_in: Vec<String>,
    link: Option<String>,
    withdrawn: Option<String>,
}

impl PypiVulnerability {
    fn into_report(self, dependency: &Dependency) -> VulnerabilityReport {
        let description = [self.summary.as_deref(), self.details.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .unwrap_or(NO_DESCRIPTION)
            .to_string();
        let cves: Vec<String> = std::iter::once(&self.id)
            .chain(self.aliases.iter())
            .filter(|id| id.starts_with("CVE-"))
            .cloned()
            .collect();

        VulnerabilityReport::new(
            &dependency.name,
            &dependency.version,
            Severity::Unknown,
            AdvisorySource::Pypi,
        )
        .with_description(description)
        .with_cves(cves)
        .with_links(prioritize_links(self.link.into_iter().collect()))
        .with_fixed_versions(self.fixed_in)
    }
}

#[derive(Deserialize)]
struct ListingEntry {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    download_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvisoryFormat {
    Json,
    Yaml,
}

impl ListingEntry {
    fn advisory_format(&self) -> Option<AdvisoryFormat> {
        if self.kind != "file" {
            return None;
        }
        if self.name.ends_with(".json") {
            Some(AdvisoryFormat::Json)
        } else if self.name.ends_with(".yaml") || self.name.ends_with(".yml") {
            Some(AdvisoryFormat::Yaml)
        } else {
            None
        }
    }
}

fn parse_advisory(body: &str, format: AdvisoryFormat) -> Result<OsvRecord, ClientError> {
    match format {
        AdvisoryFormat::Json => {
            serde_json::from_str(body).map_err(|e| ClientError::Payload(e.to_string()))
        }
        AdvisoryFormat::Yaml => {
            serde_yaml::from_str(body).map_err(|e| ClientError::Payload(e.to_string()))
        }
    }
}

fn database_report(record: &OsvRecord, dependency: &Dependency) -> VulnerabilityReport {
    let mut links = record.reference_urls(false);
    links.push(format!("{}/{}/{}.json", ADVISORY_TREE, dependency.name, record.id));

    VulnerabilityReport::new(
        &dependency.name,
        &dependency.version,
        record.severity(),
        AdvisorySource::Pypi,
    )
    .with_description(record.description())
    .with_cves(record.cve_ids())
    .with_links(prioritize_links(links))
    .with_fixed_versions(record.fixed_versions())
}

#[async_trait]
impl SourceClient for PypiClient {
    fn source(&self) -> AdvisorySource {
        AdvisorySource::Pypi
    }

    fn supports(&self, ecosystem: Ecosystem) -> bool {
        ecosystem == Ecosystem::PyPI
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
