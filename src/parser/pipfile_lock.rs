use super::{ManifestParser, ParseError};
use crate::model::{Dependency, ManifestKind, UNRESOLVED_VERSION};
use serde::Deserialize;
use std::collections::BTreeMap;

pub struct PipfileLockParser;

#[derive(Deserialize)]
struct PipfileLock {
    #[serde(default)]
    default: BTreeMap<String, PipfileEntry>,
    #[serde(default)]
    develop: BTreeMap<String, PipfileEntry>,
}

#[derive(Deserialize)]
struct PipfileEntry {
    version: Option<String>,
}

impl PipfileEntry {
    fn pinned_version(&self) -> String {
        self.version
            .as_deref()
            .map(|v| v.trim_start_matches("==").to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| UNRESOLVED_VERSION.to_string())
    }
}

impl ManifestParser for PipfileLockParser {
    fn kind(&self) -> ManifestKind {
        ManifestKind::PipfileLock
    }

    fn parse(&self, content: &str) -> Result<Vec<Dependency>, ParseError> {
        let lock: PipfileLock = serde_json::from_str(content).map_err(|source| ParseError::Json {
            kind: self.kind(),
            source,
        })?;

        let default = lock
            .default
            .iter()
            .map(|(name, entry)| Dependency::new(name, entry.pinned_version()));
        let develop = lock
            .develop
            .iter()
            .map(|(name, entry)| Dependency::new(name, entry.pinned_version()).dev(true));

        Ok(default.chain(develop).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pipfile_lock() {
        let content = r#"{
            "_meta": { "hash": { "sha256": "x" } },
            "default": {
                "requests": { "hashes": [], "version": "==2.19.0" },
                "editable-pkg": { "editable": true, "path": "." }
            },
            "develop": {
                "pytest": { "version": "==7.1.0" }
            }
        }"#;

        let deps = PipfileLockParser.parse(content).unwrap();
        assert_eq!(deps.len(), 3);

        let requests = deps.iter().find(|d| d.name == "requests").unwrap();
        assert_eq!(requests.version, "2.19.0");
        assert!(!requests.is_dev);

        let editable = deps.iter().find(|d| d.name == "editable-pkg").unwrap();
        assert_eq!(editable.version, "latest");

        assert!(deps.iter().find(|d| d.name == "pytest").unwrap().is_dev);
    }
}
