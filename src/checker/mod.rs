//! Advisory source clients.
//!
//! Each client maps one provider's wire format onto [`VulnerabilityReport`]s.
//! Clients never fail the caller: transport errors, unexpected statuses and
//! malformed payloads come back as [`QueryOutcome::Failed`], which the engine
//! counts as zero findings.
//!
//! | Client | Source | Ecosystems |
//! |--------|--------|------------|
//! | [`OsvClient`] | OSV.dev | npm, PyPI |
//! | [`NpmRegistryClient`] | npm audit endpoint | npm |
//! | [`PypiClient`] | PyPI JSON API + PyPA advisory database | PyPI |

mod advisory;
mod npm_registry;
mod osv;
mod pypi;
pub mod severity;

pub use advisory::prioritize_links;
pub(crate) use advisory::NO_DESCRIPTION;
pub use npm_registry::NpmRegistryClient;
pub use osv::OsvClient;
pub use pypi::PypiClient;
pub use severity::{parse_cvss_score, severity_from_label};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::cache::RunContext;
use crate::config::Config;
use crate::model::{AdvisorySource, Dependency, Ecosystem, VulnerabilityReport};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// The result of one dependency lookup against one source.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Findings(Vec<VulnerabilityReport>),
    Failed(String),
}

impl QueryOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, QueryOutcome::Failed(_))
    }

    /// The findings, or nothing for a failed query.
    pub fn into_reports(self) -> Vec<VulnerabilityReport> {
        match self {
            QueryOutcome::Findings(reports) => reports,
            QueryOutcome::Failed(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid advisory payload: {0}")]
    Payload(String),
}

/// A provider of vulnerability advisories.
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn source(&self) -> AdvisorySource;

    /// Whether this source has advisories for an ecosystem.
    fn supports(&self, ecosystem: Ecosystem) -> bool;

    /// Looks up advisories for one dependency. Never panics or errors; any
    /// failure is reported as [`QueryOutcome::Failed`].
    async fn query(
        &self,
        dependency: &Dependency,
        ecosystem: Ecosystem,
        ctx: &RunContext,
    ) -> QueryOutcome;
}

/// Runs `fetch` unless the run already has an answer for this dependency,
/// caching successful lookups.
pub(crate) async fn cached_query<F>(
    ctx: &RunContext,
    source: AdvisorySource,
    ecosystem: Ecosystem,
    dependency: &Dependency,
    fetch: F,
) -> QueryOutcome
where
    F: Future<Output = Result<Vec<VulnerabilityReport>, ClientError>>,
{
    let scope = (source, ecosystem);
    if let Some(reports) = ctx.cache().get(scope, dependency) {
        debug!(
            "{} cache hit for {}@{}",
            source, dependency.name, dependency.version
        );
        return QueryOutcome::Findings(reports);
    }

    match fetch.await {
        Ok(reports) => {
            ctx.cache().insert(scope, dependency, reports.clone());
            QueryOutcome::Findings(reports)
        }
        Err(e) => {
            debug!(
                "{} lookup failed for {}@{}: {}",
                source, dependency.name, dependency.version, e
            );
            QueryOutcome::Failed(e.to_string())
        }
    }
}

/// Builds the HTTP client shared by all sources.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Returns every source client, configured from `config`.
pub fn default_clients(config: &Config) -> Result<Vec<Arc<dyn SourceClient>>, ClientError> {
    let client = http_client(config.request_timeout())?;
    let endpoints = &config.endpoints;

    Ok(vec![
        Arc::new(NpmRegistryClient::with_client(
            client.clone(),
            &endpoints.npm_registry,
        )),
        Arc::new(PypiClient::with_client(
            client.clone(),
            &endpoints.pypi,
            &endpoints.pypa_advisories,
        )),
        Arc::new(OsvClient::with_client(client, &endpoints.osv)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;

    #[test]
    fn test_outcome_into_reports() {
        let report = VulnerabilityReport::new("a", "1", Severity::Low, AdvisorySource::Osv);
        assert_eq!(
            QueryOutcome::Findings(vec![report.clone()]).into_reports(),
            vec![report]
        );
        assert!(QueryOutcome::Failed("timeout".into()).into_reports().is_empty());
        assert!(QueryOutcome::Failed("timeout".into()).is_failed());
    }

    #[tokio::test]
    async fn test_cached_query_only_caches_success() {
        let ctx = RunContext::new();
        let dep = Dependency::new("requests", "2.19.0");

        let failed = cached_query(&ctx, AdvisorySource::Pypi, Ecosystem::PyPI, &dep, async {
            Err(ClientError::Payload("bad".into()))
        })
        .await;
        assert!(failed.is_failed());
        assert!(ctx.cache().is_empty());

        let ok = cached_query(&ctx, AdvisorySource::Pypi, Ecosystem::PyPI, &dep, async {
            Ok(Vec::new())
        })
        .await;
        assert_eq!(ok, QueryOutcome::Findings(Vec::new()));

        let hit = cached_query(&ctx, AdvisorySource::Pypi, Ecosystem::PyPI, &dep, async {
            Err(ClientError::Payload("not reached".into()))
        })
        .await;
        assert_eq!(hit, QueryOutcome::Findings(Vec::new()));
    }

    #[test]
    fn test_default_clients_cover_both_ecosystems() {
        let clients = default_clients(&Config::default()).unwrap();
        assert_eq!(clients.len(), 3);
        assert!(clients
            .iter()
            .any(|c| c.source() == AdvisorySource::Osv && c.supports(Ecosystem::PyPI)));
        assert!(clients
            .iter()
            .filter(|c| c.supports(Ecosystem::Npm))
            .all(|c| c.source() != AdvisorySource::Pypi));
    }
}
