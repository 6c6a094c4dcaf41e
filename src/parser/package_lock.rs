use super::{ManifestParser, ParseError};
use crate::model::{Dependency, ManifestKind};
use serde::Deserialize;
use std::collections::BTreeMap;

pub struct PackageLockParser;

#[derive(Deserialize)]
struct PackageLock {
    /// lockfileVersion 1
    dependencies: Option<BTreeMap<String, LockEntry>>,
    /// lockfileVersion 2 and 3, keyed by install path
    packages: Option<BTreeMap<String, LockEntry>>,
}

#[derive(Deserialize)]
struct LockEntry {
    version: Option<String>,
    #[serde(default)]
    dev: bool,
    integrity: Option<String>,
    #[serde(default)]
    link: bool,
}

impl LockEntry {
    fn into_dependency(self, name: impl Into<String>) -> Dependency {
        Dependency::new(name, self.version.unwrap_or_default())
            .dev(self.dev)
            .with_integrity(self.integrity)
    }
}

impl ManifestParser for PackageLockParser {
    fn kind(&self) -> ManifestKind {
        ManifestKind::PackageLock
    }

    fn parse(&self, content: &str) -> Result<Vec<Dependency>, ParseError> {
        let lock: PackageLock = serde_json::from_str(content).map_err(|source| ParseError::Json {
            kind: self.kind(),
            source,
        })?;

        if let Some(dependencies) = lock.dependencies {
            return Ok(dependencies
                .into_iter()
                .map(|(name, entry)| entry.into_dependency(name))
                .collect());
        }

        let packages = lock.packages.unwrap_or_default();
        Ok(packages
            .into_iter()
            .filter(|(path, entry)| !path.is_empty() && !entry.link)
            .map(|(path, entry)| {
                let name = path
                    .rsplit_once("node_modules/")
                    .map(|(_, name)| name.to_string())
                    .unwrap_or(path);
                entry.into_dependency(name)
            })
            .collect())
    }
}
