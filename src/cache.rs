//! Per-run query cache.
//!
//! Advisory lookups are memoised for the lifetime of one engine run, keyed by
//! source, ecosystem and `package@version`. The cache lives inside a [`RunContext`] that
//! the engine creates at the start of every run and drops at the end, so
//! nothing leaks between independent runs.
//!
//! # Example
//!
//! ```
//! use depscan::cache::RunContext;
//! use depscan::{AdvisorySource, Dependency, Ecosystem};
//!
//! let ctx = RunContext::new();
//! let dep = Dependency::new("requests", "2.19.0");
//! let source = (AdvisorySource::Pypi, Ecosystem::PyPI);
//!
//! assert!(ctx.cache().get(source, &dep).is_none());
//! ctx.cache().insert(source, &dep, Vec::new());
//! assert_eq!(ctx.cache().get(source, &dep), Some(Vec::new()));
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::model::{AdvisorySource, Dependency, Ecosystem, VulnerabilityReport};

/// A source queried within one ecosystem.
pub type CacheScope = (AdvisorySource, Ecosystem);

/// In-memory cache of successful lookups.
///
/// Only successful lookups are stored; a failed query is retried the next
/// time the same `package@version` shows up in the run.
#[derive(Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<String, Vec<VulnerabilityReport>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key((source, ecosystem): CacheScope, dependency: &Dependency) -> String {
        format!(
            "{}:{}:{}@{}",
            source, ecosystem, dependency.name, dependency.version
        )
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<VulnerabilityReport>>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Retrieves the reports cached for a source and dependency.
    pub fn get(&self, scope: CacheScope, dependency: &Dependency) -> Option<Vec<VulnerabilityReport>> {
        self.lock().get(&Self::key(scope, dependency)).cloned()
    }

    /// Stores the reports a source returned for a dependency.
    pub fn insert(
        &self,
        scope: CacheScope,
        dependency: &Dependency,
        reports: Vec<VulnerabilityReport>,
    ) {
        self.lock().insert(Self::key(scope, dependency), reports);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State scoped to a single engine run.
pub struct RunContext {
    cache: QueryCache,
    started: Instant,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            cache: QueryCache::new(),
            started: Instant::now(),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
