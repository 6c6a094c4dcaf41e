use super::{ManifestParser, ParseError};
use crate::model::{Dependency, ManifestKind};
use serde::Deserialize;

pub struct PoetryLockParser;

#[derive(Deserialize)]
struct PoetryLock {
    #[serde(default)]
    package: Vec<PoetryPackage>,
}

#[derive(Deserialize)]
struct PoetryPackage {
    name: String,
    version: String,
    category: Option<String>,
}

impl ManifestParser for PoetryLockParser {
    fn kind(&self) -> ManifestKind {
        ManifestKind::PoetryLock
    }

    fn parse(&self, content: &str) -> Result<Vec<Dependency>, ParseError> {
        let lock: PoetryLock = toml::from_str(content).map_err(|source| ParseError::Toml {
            kind: self.kind(),
            source,
        })?;

        Ok(lock
            .package
            .into_iter()
            .map(|pkg| {
                let is_dev = pkg.category.as_deref() == Some("dev");
                Dependency::new(pkg.name, pkg.version).dev(is_dev)
            })
            .collect())
    }
}
