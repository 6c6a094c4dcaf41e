use super::{ManifestParser, ParseError};
use crate::model::{Dependency, ManifestKind};
use serde::Deserialize;
use std::collections::BTreeMap;

pub struct PackageJsonParser;

#[derive(Deserialize)]
struct PackageJson {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, String>,
}

impl ManifestParser for PackageJsonParser {
    fn kind(&self) -> ManifestKind {
        ManifestKind::PackageJson
    }

    fn parse(&self, content: &str) -> Result<Vec<Dependency>, ParseError> {
        let manifest: PackageJson =
            serde_json::from_str(content).map_err(|source| ParseError::Json {
                kind: self.kind(),
                source,
            })?;

        let prod = manifest
            .dependencies
            .into_iter()
            .map(|(name, version)| Dependency::new(name, version));
        let dev = manifest
            .dev_dependencies
            .into_iter()
            .map(|(name, version)| Dependency::new(name, version).dev(true));

        Ok(prod.chain(dev).collect())
    }
}
