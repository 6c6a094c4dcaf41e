pub mod cache;
pub mod checker;
pub mod config;
pub mod engine;
pub mod model;
pub mod output;
pub mod parser;

pub use config::{Config, IgnoreRules};
pub use engine::{CheckError, Engine, EngineOptions};
pub use model::{
    AdvisorySource, CheckResult, Dependency, Ecosystem, ManifestKind, ParsedManifest, Severity,
    VulnerabilityReport,
};
