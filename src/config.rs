//! Configuration file and ignore-list handling.
//!
//! This module provides loading and saving of depscan configuration from a
//! TOML file, and loading of the JSON ignore list passed with `--ignore`.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/depscan/config.toml`
//! - macOS: `~/Library/Application Support/depscan/config.toml`
//! - Windows: `%APPDATA%\depscan\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! batch_size = 10
//! request_timeout_secs = 10
//! default_format = "table"
//!
//! [ignore]
//! cve_ids = ["CVE-2021-12345"]
//! severities = ["LOW"]
//!
//! [endpoints]
//! osv = "https://api.osv.dev"
//! npm_registry = "https://registry.npmjs.org"
//! ```
//!
//! # Ignore List
//!
//! ```json
//! { "cveIds": ["CVE-2020-8203"], "severityIgnore": ["LOW", "MODERATE"] }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::model::{Severity, VulnerabilityReport};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid ignore list {path}: {source}")]
    IgnoreList {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("ignore list file not found: {0}")]
    IgnoreListNotFound(PathBuf),
}

/// Application configuration.
///
/// # Example
///
/// ```no_run
/// use depscan::Config;
///
/// // Load from file (or use defaults if file doesn't exist)
/// let config = Config::load().unwrap();
///
/// println!("Batch size: {}", config.batch_size);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many dependencies are queried concurrently.
    ///
    /// Default: 10
    pub batch_size: usize,

    /// Per-request timeout for advisory providers, in seconds.
    ///
    /// Default: 10
    pub request_timeout_secs: u64,

    /// Default output format when `--json` is not given.
    ///
    /// Valid values: "table", "json"
    /// Default: "table"
    pub default_format: String,

    /// Suppression rules applied to every run.
    pub ignore: IgnoreConfig,

    /// Advisory provider base URLs.
    pub endpoints: Endpoints,
}

/// Suppression rules from the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// CVE IDs to suppress (e.g., "CVE-2021-12345").
    pub cve_ids: Vec<String>,

    /// Severities to suppress entirely.
    pub severities: Vec<Severity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub osv: String,
    pub npm_registry: String,
    pub pypi: String,
    pub pypa_advisories: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            osv: "https://api.osv.dev".to_string(),
            npm_registry: "https://registry.npmjs.org".to_string(),
            pypi: "https://pypi.org/pypi".to_string(),
            pypa_advisories: "https://api.github.com/repos/pypa/advisory-database/contents/vulns"
                .to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 10,
            request_timeout_secs: 10,
            default_format: "table".to_string(),
            ignore: IgnoreConfig::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Saves the configuration to the config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(io_err)
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("depscan")
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// The JSON ignore list accepted by `--ignore`. Absent fields suppress nothing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreList {
    #[serde(default)]
    pub cve_ids: Vec<String>,
    #[serde(default)]
    pub severity_ignore: Vec<Severity>,
}

impl IgnoreList {
    /// Reads an ignore list file. A missing file or malformed JSON (including
    /// an unknown severity name) is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::IgnoreListNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::IgnoreList {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Suppression rules for one run, fixed before the run starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreRules {
    pub cve_ids: BTreeSet<String>,
    pub severities: BTreeSet<Severity>,
}

impl IgnoreRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cve_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cve_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_severities<I>(mut self, severities: I) -> Self
    where
        I: IntoIterator<Item = Severity>,
    {
        self.severities.extend(severities);
        self
    }

    /// Unions the config file's rules with an optional `--ignore` list.
    pub fn from_sources(config: &IgnoreConfig, list: Option<&IgnoreList>) -> Self {
        let mut rules = Self::new()
            .with_cve_ids(config.cve_ids.iter().cloned())
            .with_severities(config.severities.iter().copied());
        if let Some(list) = list {
            rules = rules
                .with_cve_ids(list.cve_ids.iter().cloned())
                .with_severities(list.severity_ignore.iter().copied());
        }
        rules
    }

    pub fn is_empty(&self) -> bool {
        self.cve_ids.is_empty() && self.severities.is_empty()
    }

    /// Whether a report is suppressed: its severity is ignored, or every one
    /// of its CVE IDs is. A report without CVE IDs is never suppressed by ID.
    pub fn matches(&self, report: &VulnerabilityReport) -> bool {
        if self.severities.contains(&report.severity) {
            return true;
        }

        !report.cve_ids.is_empty() && report.cve_ids.iter().all(|id| self.cve_ids.contains(id))
    }
}
