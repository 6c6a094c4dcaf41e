//! Dependency manifest parsers.
//!
//! This module provides the [`ManifestParser`] trait and one implementation
//! per supported file format. Parsers are pure: they take file content and
//! return the [`Dependency`] records it declares.
//!
//! | Parser | File | Ecosystem |
//! |--------|------|-----------|
//! | [`PackageJsonParser`] | `package.json` | npm |
//! | [`PackageLockParser`] | `package-lock.json` | npm |
//! | [`YarnLockParser`] | `yarn.lock` | npm |
//! | [`RequirementsTxtParser`] | `requirements.txt` | PyPI |
//! | [`PipfileLockParser`] | `Pipfile.lock` | PyPI |
//! | [`PoetryLockParser`] | `poetry.lock` | PyPI |
//!
//! # Example
//!
//! ```
//! use depscan::parser::parser_for;
//! use depscan::ManifestKind;
//!
//! let parser = parser_for(ManifestKind::RequirementsTxt);
//! let deps = parser.parse("requests==2.19.0\nflask\n").unwrap();
//! assert_eq!(deps[0].version, "2.19.0");
//! assert_eq!(deps[1].version, "latest");
//! ```

mod package_json;
mod package_lock;
mod pipfile_lock;
mod poetry_lock;
mod requirements_txt;
mod yarn_lock;

pub use package_json::PackageJsonParser;
pub use package_lock::PackageLockParser;
pub use pipfile_lock::PipfileLockParser;
pub use poetry_lock::PoetryLockParser;
pub use requirements_txt::RequirementsTxtParser;
pub use yarn_lock::YarnLockParser;

use crate::model::{Dependency, ManifestKind, ParsedManifest};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Directories never descended into when discovering manifests.
const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".venv",
    "venv",
    "__pycache__",
    ".tox",
    "target",
];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {kind}: {source}")]
    Json {
        kind: ManifestKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid TOML in {kind}: {source}")]
    Toml {
        kind: ManifestKind,
        #[source]
        source: toml::de::Error,
    },

    #[error("malformed {kind}: {message}")]
    Malformed { kind: ManifestKind, message: String },
}

/// Parses the content of one manifest format.
pub trait ManifestParser: Send + Sync {
    /// Returns the manifest kind this parser handles.
    fn kind(&self) -> ManifestKind;

    /// Parses file content into dependency records.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid for this format.
    fn parse(&self, content: &str) -> Result<Vec<Dependency>, ParseError>;
}

/// Returns the parser for a manifest kind.
pub fn parser_for(kind: ManifestKind) -> Box<dyn ManifestParser> {
    match kind {
        ManifestKind::PackageJson => Box::new(PackageJsonParser),
        ManifestKind::PackageLock => Box::new(PackageLockParser),
        ManifestKind::YarnLock => Box::new(YarnLockParser),
        ManifestKind::RequirementsTxt => Box::new(RequirementsTxtParser),
        ManifestKind::PipfileLock => Box::new(PipfileLockParser),
        ManifestKind::PoetryLock => Box::new(PoetryLockParser),
    }
}

/// Reads and parses a manifest file.
///
/// # Errors
///
/// Returns an error if the file is missing, unreadable or malformed. All of
/// these are fatal input errors for a run.
pub fn parse_file(path: &Path, kind: ManifestKind) -> Result<ParsedManifest, ParseError> {
    if !path.exists() {
        return Err(ParseError::NotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let dependencies = parser_for(kind).parse(&content)?;
    debug!(
        "Parsed {} dependencies from {}",
        dependencies.len(),
        path.display()
    );

    Ok(ParsedManifest::new(kind, path, dependencies))
}

/// Drops manifests superseded by a lock file of the same ecosystem in the
/// same directory.
///
/// `package-lock.json` or `yarn.lock` win over `package.json`;
/// `Pipfile.lock` or `poetry.lock` win over `requirements.txt`. Two lock
/// files of the same ecosystem are both kept.
pub fn prioritize(files: Vec<(PathBuf, ManifestKind)>) -> Vec<(PathBuf, ManifestKind)> {
    let has = |dir: Option<&Path>, kind: ManifestKind| {
        files
            .iter()
            .any(|(path, k)| *k == kind && path.parent() == dir)
    };

    let superseded: Vec<bool> = files
        .iter()
        .map(|(path, kind)| {
            let dir = path.parent();
            match kind {
                ManifestKind::PackageJson => {
                    has(dir, ManifestKind::PackageLock) || has(dir, ManifestKind::YarnLock)
                }
                ManifestKind::RequirementsTxt => {
                    has(dir, ManifestKind::PipfileLock) || has(dir, ManifestKind::PoetryLock)
                }
                _ => false,
            }
        })
        .collect();

    files
        .into_iter()
        .zip(superseded)
        .filter(|(file, dropped)| {
            if *dropped {
                debug!("Skipping {}: lock file present", file.0.display());
            }
            !dropped
        })
        .map(|(file, _)| file)
        .collect()
}

/// Finds every recognised manifest below `root`.
pub fn discover(root: &Path) -> Vec<(PathBuf, ManifestKind)> {
    let mut found: Vec<(PathBuf, ManifestKind)> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() > 0
                && entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .map(|name| SKIPPED_DIRS.contains(&name))
                    .unwrap_or(false))
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let kind = ManifestKind::detect(entry.path())?;
            Some((entry.into_path(), kind))
        })
        .collect();

    found.sort_by(|a, b| a.0.cmp(&b.0));
    found
}
