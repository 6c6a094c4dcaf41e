//! The aggregation engine.
//!
//! One [`Engine::check`] call is one run:
//!
//! 1. Dependencies are grouped by the ecosystem of the manifest they came
//!    from. Unresolved versions are counted but never queried.
//! 2. Each ecosystem's dependencies are queried in batches. Batches run one
//!    after another; within a batch every dependency and every applicable
//!    source is queried concurrently, each query bounded by a timeout.
//! 3. Reports are reconciled ([`merge_reports`]), filtered by the ignore
//!    rules, ordered and summarized into a [`CheckResult`].
//!
//! A failed or timed out query contributes no findings and never fails the
//! run.

mod merge;
mod summary;

pub use merge::{merge_reports, same_finding};
pub use summary::{apply_ignore_rules, order_reports, Statistics};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::RunContext;
use crate::checker::{default_clients, ClientError, QueryOutcome, SourceClient};
use crate::config::{Config, IgnoreRules};
use crate::model::{
    AdvisorySource, CheckResult, Dependency, Ecosystem, ParsedManifest, ScannedFile,
    VulnerabilityReport,
};

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("no dependencies to check")]
    NoDependencies,

    #[error("failed to set up advisory sources: {0}")]
    Client(#[from] ClientError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Dependencies queried concurrently per batch. Values below 1 are
    /// treated as 1.
    pub batch_size: usize,
    /// Upper bound on a single source query.
    pub query_timeout: Duration,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size(),
            query_timeout: config.request_timeout(),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Everything the sources returned during one run, before reconciliation.
#[derive(Debug, Default)]
struct Gathered {
    reports: Vec<VulnerabilityReport>,
    failures: usize,
}

pub struct Engine {
    clients: Vec<Arc<dyn SourceClient>>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(clients: Vec<Arc<dyn SourceClient>>, options: EngineOptions) -> Self {
        Self { clients, options }
    }

    /// An engine over the OSV, npm registry and PyPI sources, configured
    /// from `config`.
    pub fn with_default_clients(config: &Config) -> Result<Self, CheckError> {
        Ok(Self::new(
            default_clients(config)?,
            EngineOptions::from_config(config),
        ))
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Checks every dependency of `manifests` against the configured
    /// sources.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::NoDependencies`] when the manifests contain no
    /// dependency at all.
    pub async fn check(
        &self,
        manifests: &[ParsedManifest],
        ignore: &IgnoreRules,
    ) -> Result<CheckResult, CheckError> {
        let total_dependencies: usize = manifests.iter().map(|m| m.dependencies.len()).sum();
        if total_dependencies == 0 {
            return Err(CheckError::NoDependencies);
        }

        let ctx = RunContext::new();
        let gathered = self.gather(manifests, &ctx).await;

        let reports = retain_scanned(gathered.reports, manifests);
        let merged = merge_reports(reports);
        let merged_count = merged.len();
        let mut vulnerabilities = apply_ignore_rules(merged, ignore);
        order_reports(&mut vulnerabilities);

        let stats = Statistics::compute(&vulnerabilities, total_dependencies);
        info!(
            "Checked {} dependencies in {:?}: {} findings ({} ignored), {} failed queries",
            total_dependencies,
            ctx.elapsed(),
            stats.vulnerabilities_found,
            merged_count - stats.vulnerabilities_found,
            gathered.failures
        );

        Ok(CheckResult {
            total_dependencies,
            vulnerable_packages: stats.vulnerable_packages,
            percentage_vulnerable: stats.percentage_vulnerable,
            vulnerabilities_found: stats.vulnerabilities_found,
            vulnerabilities,
            summary: stats.by_severity,
            scanned_files: manifests
                .iter()
                .map(|m| ScannedFile {
                    path: m.path.clone(),
                    kind: m.kind,
                    dependency_count: m.dependencies.len(),
                })
                .collect(),
            failed_queries: gathered.failures,
            scan_time: Utc::now(),
        })
    }

    async fn gather(&self, manifests: &[ParsedManifest], ctx: &RunContext) -> Gathered {
        let mut gathered = Gathered::default();

        for ecosystem in [Ecosystem::Npm, Ecosystem::PyPI] {
            let clients: Vec<&Arc<dyn SourceClient>> = self
                .clients
                .iter()
                .filter(|client| client.supports(ecosystem))
                .collect();
            let dependencies = queryable(manifests, ecosystem);
            if dependencies.is_empty() || clients.is_empty() {
                continue;
            }

            debug!(
                "Querying {} {} dependencies against {} sources",
                dependencies.len(),
                ecosystem,
                clients.len()
            );

            for batch in dependencies.chunks(self.options.batch_size.max(1)) {
                let outcomes = join_all(
                    batch
                        .iter()
                        .map(|dep| self.query_sources(&clients, dep, ecosystem, ctx)),
                )
                .await;

                for (dependency, results) in batch.iter().zip(outcomes) {
                    for (source, outcome) in results {
                        match outcome {
                            QueryOutcome::Findings(reports) => gathered.reports.extend(
                                reports.into_iter().map(|r| r.in_ecosystem(ecosystem)),
                            ),
                            QueryOutcome::Failed(reason) => {
                                warn!(
                                    "{} query for {}@{} failed: {}",
                                    source, dependency.name, dependency.version, reason
                                );
                                gathered.failures += 1;
                            }
                        }
                    }
                }
            }
        }

        gathered
    }

    /// Queries every applicable source for one dependency concurrently.
    async fn query_sources(
        &self,
        clients: &[&Arc<dyn SourceClient>],
        dependency: &Dependency,
        ecosystem: Ecosystem,
        ctx: &RunContext,
    ) -> Vec<(AdvisorySource, QueryOutcome)> {
        let timeout = self.options.query_timeout;
        join_all(clients.iter().map(|client| async move {
            let outcome =
                match tokio::time::timeout(timeout, client.query(dependency, ecosystem, ctx)).await
                {
                    Ok(outcome) => outcome,
                    Err(_) => QueryOutcome::Failed(format!("timed out after {:?}", timeout)),
                };
            (client.source(), outcome)
        }))
        .await
    }
}

/// The distinct resolved dependencies of one ecosystem, in manifest order.
fn queryable(manifests: &[ParsedManifest], ecosystem: Ecosystem) -> Vec<&Dependency> {
    let mut seen = HashSet::new();
    let mut dependencies = Vec::new();

    for dep in manifests
        .iter()
        .filter(|m| m.ecosystem() == ecosystem)
        .flat_map(|m| m.dependencies.iter())
    {
        if !dep.is_resolved() {
            debug!("Skipping {}: no concrete version", dep.name);
            continue;
        }
        if seen.insert((dep.name.as_str(), dep.version.as_str())) {
            dependencies.push(dep);
        }
    }

    dependencies
}

/// Keeps only reports about a `(package, version)` present in the input.
fn retain_scanned(
    reports: Vec<VulnerabilityReport>,
    manifests: &[ParsedManifest],
) -> Vec<VulnerabilityReport> {
    let scanned: HashSet<(&str, &str)> = manifests
        .iter()
        .flat_map(|m| m.dependencies.iter())
        .map(|d| (d.name.as_str(), d.version.as_str()))
        .collect();

    reports
        .into_iter()
        .filter(|report| {
            let known = scanned.contains(&report.key());
            if !known {
                warn!(
                    "Discarding {} report for unscanned {}@{}",
                    report.source, report.package, report.version
                );
            }
            known
        })
        .collect()
}
