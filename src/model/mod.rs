//! Core data types for dependencies, findings, and check results.
//!
//! This module contains the fundamental types used throughout depscan:
//!
//! - [`Dependency`] - A package pinned (or not) by a manifest
//! - [`ManifestKind`] / [`Ecosystem`] - Where a dependency came from
//! - [`ParsedManifest`] - The dependencies of one manifest file
//! - [`VulnerabilityReport`] - One finding from one advisory source
//! - [`CheckResult`] - The reconciled output of a run
//!
//! # Example
//!
//! ```
//! use depscan::{Dependency, ManifestKind, ParsedManifest};
//!
//! let manifest = ParsedManifest::new(
//!     ManifestKind::PackageLock,
//!     "package-lock.json",
//!     vec![Dependency::new("lodash", "4.17.15")],
//! );
//!
//! println!("{} dependencies", manifest.dependencies.len());
//! ```

mod dependency;
mod result;
mod vulnerability;

pub use dependency::*;
pub use result::*;
pub use vulnerability::*;
