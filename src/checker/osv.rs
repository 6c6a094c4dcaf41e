use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::advisory::{prioritize_links, OsvRecord};
use super::{cached_query, ClientError, QueryOutcome, SourceClient};
use crate::cache::RunContext;
use crate::model::{AdvisorySource, Dependency, Ecosystem, VulnerabilityReport};

const DEFAULT_BASE_URL: &str = "https://api.osv.dev";

/// Queries OSV.dev, which aggregates advisories for every ecosystem.
pub struct OsvClient {
    client: reqwest::Client,
    base_url: String,
}

impl OsvClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    async fn fetch(
        &self,
        dependency: &Dependency,
        ecosystem: Ecosystem,
    ) -> Result<Vec<VulnerabilityReport>, ClientError> {
        let url = format!("{}/v1/query", self.base_url.trim_end_matches('/'));
        let query = OsvQuery {
            package: OsvPackage {
                name: &dependency.name,
                ecosystem: ecosystem.osv_name(),
            },
            version: dependency.query_version(),
        };

        let response = self.client.post(&url).json(&query).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let body: OsvResponse = response.json().await?;
        debug!(
            "OSV returned {} records for {}@{}",
            body.vulns.len(),
            dependency.name,
            dependency.version
        );

        Ok(body
            .vulns
            .iter()
            .map(|record| to_report(record, dependency))
            .collect())
    }
}

impl Default for OsvClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct OsvQuery<'a> {
    package: OsvPackage<'a>,
    version: &'a str,
}

#[derive(Serialize)]
struct OsvPackage<'a> {
    name: &'a str,
    ecosystem: &'a str,
}

#[derive(Deserialize)]
struct OsvResponse {
    #[serde(default)]
    vulns: Vec<OsvRecord>,
}

fn to_report(record: &OsvRecord, dependency: &Dependency) -> VulnerabilityReport {
    VulnerabilityReport::new(
        &dependency.name,
        &dependency.version,
        record.severity(),
        AdvisorySource::Osv,
    )
    .with_description(record.description())
    .with_cves(record.cve_ids())
    .with_links(prioritize_links(record.reference_urls(true)))
    .with_fixed_versions(record.fixed_versions())
}

#[async_trait]
impl SourceClient for OsvClient {
    fn source(&self) -> AdvisorySource {
        AdvisorySource::Osv
    }

    fn supports(&self, _ecosystem: Ecosystem) -> bool {
        true
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
            self.fetch(dependency, ecosystem),
        )
        .await
    }
}
