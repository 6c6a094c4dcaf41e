use super::{ManifestParser, ParseError};
use crate::model::{Dependency, ManifestKind, UNRESOLVED_VERSION};

pub struct RequirementsTxtParser;

impl ManifestParser for RequirementsTxtParser {
    fn kind(&self) -> ManifestKind {
        ManifestKind::RequirementsTxt
    }

    fn parse(&self, content: &str) -> Result<Vec<Dependency>, ParseError> {
        Ok(content.lines().filter_map(parse_requirement).collect())
    }
}

/// Parses one requirement line such as `requests[security]>=2.19.0 ; python_version < "3.8"`.
///
/// The version is whatever follows the first comparison operator, so
/// `>=2.19.0` yields `2.19.0`. Exclusions (`!=`) and bare names yield
/// [`UNRESOLVED_VERSION`].
fn parse_requirement(line: &str) -> Option<Dependency> {
    let line = line.split(" #").next()?.split(';').next()?.trim();

    if line.is_empty()
        || line.starts_with('#')
        || line.starts_with('-')
        || line.starts_with('.')
        || line.starts_with('/')
        || line.contains("://")
    {
        return None;
    }

    let name_end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if name.is_empty() {
        return None;
    }

    let mut rest = line[name_end..].trim_start();
    if rest.starts_with('[') {
        rest = rest.split_once(']').map(|(_, r)| r.trim_start()).unwrap_or("");
    }

    let op_end = rest
        .find(|c: char| !matches!(c, '~' | '=' | '>' | '<' | '!'))
        .unwrap_or(rest.len());
    let operator = &rest[..op_end];
    let after_op = rest[op_end..].trim_start();

    let version_end = after_op
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.'))
        .unwrap_or(after_op.len());
    let version = &after_op[..version_end];

    let pinned = !operator.is_empty()
        && !operator.contains('!')
        && version.starts_with(|c: char| c.is_ascii_digit());

    let version = if pinned { version } else { UNRESOLVED_VERSION };
    Some(Dependency::new(name, version))
}
