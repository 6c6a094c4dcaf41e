use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Version placeholder used by parsers when a manifest does not pin one.
pub const UNRESOLVED_VERSION: &str = "latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ecosystem {
    #[serde(rename = "npm")]
    Npm,
    #[serde(rename = "PyPI")]
    PyPI,
}

impl Ecosystem {
    /// Ecosystem identifier understood by OSV.dev.
    pub fn osv_name(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::PyPI => "PyPI",
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.osv_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManifestKind {
    #[serde(rename = "package.json")]
    PackageJson,
    #[serde(rename = "package-lock.json")]
    PackageLock,
    #[serde(rename = "yarn.lock")]
    YarnLock,
    #[serde(rename = "requirements.txt")]
    RequirementsTxt,
    #[serde(rename = "Pipfile.lock")]
    PipfileLock,
    #[serde(rename = "poetry.lock")]
    PoetryLock,
}

impl ManifestKind {
    pub const ALL: [ManifestKind; 6] = [
        ManifestKind::PackageJson,
        ManifestKind::PackageLock,
        ManifestKind::YarnLock,
        ManifestKind::RequirementsTxt,
        ManifestKind::PipfileLock,
        ManifestKind::PoetryLock,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            ManifestKind::PackageJson => "package.json",
            ManifestKind::PackageLock => "package-lock.json",
            ManifestKind::YarnLock => "yarn.lock",
            ManifestKind::RequirementsTxt => "requirements.txt",
            ManifestKind::PipfileLock => "Pipfile.lock",
            ManifestKind::PoetryLock => "poetry.lock",
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        match self {
            ManifestKind::PackageJson | ManifestKind::PackageLock | ManifestKind::YarnLock => {
                Ecosystem::Npm
            }
            ManifestKind::RequirementsTxt | ManifestKind::PipfileLock | ManifestKind::PoetryLock => {
                Ecosystem::PyPI
            }
        }
    }

    /// Detects the manifest kind from a file's base name (case-insensitive).
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.file_name().to_lowercase() == name)
    }
}

impl std::fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

/// A single package entry produced by a manifest parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub name: String,
    /// Literal version, range specifier, or [`UNRESOLVED_VERSION`].
    pub version: String,
    pub is_dev: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            is_dev: false,
            integrity: None,
        }
    }

    pub fn dev(mut self, is_dev: bool) -> Self {
        self.is_dev = is_dev;
        self
    }

    pub fn with_integrity(mut self, integrity: Option<String>) -> Self {
        self.integrity = integrity;
        self
    }

    /// Returns false when there is no concrete version to query advisories for.
    pub fn is_resolved(&self) -> bool {
        let version = self.version.trim();
        !version.is_empty() && version != UNRESOLVED_VERSION
    }

    /// The version sent to providers: leading range operators and anything
    /// after the first whitespace are dropped, so `^4.17.15` becomes `4.17.15`.
    pub fn query_version(&self) -> &str {
        let trimmed = self
            .version
            .trim()
            .trim_start_matches(|c: char| matches!(c, '^' | '~' | '=' | '>' | '<' | 'v' | ' '));
        trimmed.split_whitespace().next().unwrap_or("")
    }
}

/// Dependencies parsed from one manifest, tagged with the manifest kind so
/// the engine can route them to the right advisory sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedManifest {
    pub kind: ManifestKind,
    pub path: PathBuf,
    pub dependencies: Vec<Dependency>,
}

impl ParsedManifest {
    pub fn new(kind: ManifestKind, path: impl Into<PathBuf>, dependencies: Vec<Dependency>) -> Self {
        Self {
            kind,
            path: path.into(),
            dependencies,
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.kind.ecosystem()
    }
}
