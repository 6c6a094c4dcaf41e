use super::{ManifestParser, ParseError};
use crate::model::{Dependency, ManifestKind};
use std::collections::HashSet;

pub struct YarnLockParser;

#[derive(Default)]
struct Entry {
    name: Option<String>,
    version: Option<String>,
    integrity: Option<String>,
}

impl ManifestParser for YarnLockParser {
    fn kind(&self) -> ManifestKind {
        ManifestKind::YarnLock
    }

    /// Handles both the classic (`version "1.0.0"`) and berry
    /// (`version: 1.0.0`) entry syntax.
    fn parse(&self, content: &str) -> Result<Vec<Dependency>, ParseError> {
        let mut entries: Vec<Entry> = Vec::new();
        let mut current: Option<Entry> = None;

        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }

            if !line.starts_with(' ') {
                let header = line.trim_end();
                let Some(descriptors) = header.strip_suffix(':') else {
                    return Err(ParseError::Malformed {
                        kind: self.kind(),
                        message: format!("line {}: expected entry header, got {:?}", lineno + 1, header),
                    });
                };
                entries.extend(current.take());
                current = Some(Entry {
                    name: package_name(descriptors),
                    ..Entry::default()
                });
                continue;
            }

            let Some(entry) = current.as_mut() else {
                continue;
            };

            // Only top-level fields of an entry (two-space indent) matter.
            if line.starts_with("    ") {
                continue;
            }

            let Some((key, value)) = split_field(line.trim()) else {
                continue;
            };
            match key {
                "version" => entry.version = Some(value),
                "integrity" | "checksum" => entry.integrity = Some(value),
                _ => {}
            }
        }
        entries.extend(current);

        let mut seen = HashSet::new();
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let name = entry.name?;
                let version = entry.version?;
                if !seen.insert(format!("{}@{}", name, version)) {
                    return None;
                }
                Some(Dependency::new(name, version).with_integrity(entry.integrity))
            })
            .collect())
    }
}

/// Extracts the package name from an entry header such as
/// `"@babel/core@^7.0.0", "@babel/core@^7.1.0"` or `"lodash@npm:^4.17.21"`.
/// The name ends at the first `@` past a scope prefix, so berry `patch:`
/// descriptors resolve to the patched package.
fn package_name(descriptors: &str) -> Option<String> {
    let first = descriptors.split(',').next()?.trim().trim_matches('"');
    let at = first.get(1..)?.find('@')? + 1;
    Some(first[..at].to_string())
}

fn split_field(line: &str) -> Option<(&str, String)> {
    let (key, value) = match line.split_once(':') {
        Some((key, value)) if !key.contains(' ') => (key, value),
        _ => line.split_once(' ')?,
    };
    let value = value.trim().trim_matches('"');
    Some((key.trim_matches('"'), value.to_string()))
}
