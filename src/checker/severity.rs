//! Severity normalization.
//!
//! Providers describe severity as a textual tier, a CVSS score, a CVSS v3
//! vector, or not at all. Everything is folded into [`Severity`].

use crate::model::Severity;
use std::collections::HashMap;

/// Buckets a CVSS base score.
pub fn severity_from_score(score: f64) -> Severity {
    match score {
        s if !(0.0..=10.0).contains(&s) => Severity::Unknown,
        s if s >= 9.0 => Severity::Critical,
        s if s >= 7.0 => Severity::High,
        s if s >= 4.0 => Severity::Moderate,
        _ => Severity::Low,
    }
}

/// Parses a CVSS v3 score, given either as a number (`"9.8"`) or as a
/// vector string (`"CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"`).
///
/// Returns `None` when the value is neither.
pub fn parse_cvss_score(score: &str) -> Option<Severity> {
    let score = score.trim();

    if let Ok(numeric) = score.parse::<f64>() {
        return Some(severity_from_score(numeric));
    }

    cvss3_base_score(score).map(severity_from_score)
}

/// Maps a provider's textual tier onto the canonical scale.
pub fn severity_from_label(label: &str) -> Severity {
    match label.trim().to_lowercase().as_str() {
        "critical" => Severity::Critical,
        "high" => Severity::High,
        "moderate" | "medium" => Severity::Moderate,
        "low" | "info" => Severity::Low,
        _ => Severity::Unknown,
    }
}

/// Computes the CVSS v3.0/v3.1 base score of a vector string.
pub fn cvss3_base_score(vector: &str) -> Option<f64> {
    let mut parts = vector.split('/');
    if !parts.next()?.starts_with("CVSS:3") {
        return None;
    }

    let metrics: HashMap<&str, &str> = parts.filter_map(|part| part.split_once(':')).collect();
    let metric = |key: &str| metrics.get(key).copied();

    let scope_changed = match metric("S")? {
        "U" => false,
        "C" => true,
        _ => return None,
    };
    let attack_vector = match metric("AV")? {
        "N" => 0.85,
        "A" => 0.62,
        "L" => 0.55,
        "P" => 0.2,
        _ => return None,
    };
    let attack_complexity = match metric("AC")? {
        "L" => 0.77,
        "H" => 0.44,
        _ => return None,
    };
    let privileges = match (metric("PR")?, scope_changed) {
        ("N", _) => 0.85,
        ("L", false) => 0.62,
        ("L", true) => 0.68,
        ("H", false) => 0.27,
        ("H", true) => 0.5,
        _ => return None,
    };
    let interaction = match metric("UI")? {
        "N" => 0.85,
        "R" => 0.62,
        _ => return None,
    };
    let impact_of = |key: &str| match metric(key)? {
        "H" => Some(0.56),
        "L" => Some(0.22),
        "N" => Some(0.0),
        _ => None,
    };
    let (c, i, a) = (impact_of("C")?, impact_of("I")?, impact_of("A")?);

    let iss = 1.0 - (1.0 - c) * (1.0 - i) * (1.0 - a);
    let impact = if scope_changed {
        7.52 * (iss - 0.029) - 3.25 * (iss - 0.02_f64).powi(15)
    } else {
        6.42 * iss
    };
    if impact <= 0.0 {
        return Some(0.0);
    }

    let exploitability = 8.22 * attack_vector * attack_complexity * privileges * interaction;
    let base = if scope_changed {
        (1.08 * (impact + exploitability)).min(10.0)
    } else {
        (impact + exploitability).min(10.0)
    };

    Some(round_up(base))
}

/// CVSS v3.1 "Roundup": smallest one-decimal number >= the input.
fn round_up(value: f64) -> f64 {
    let int_input = (value * 100_000.0).round() as i64;
    if int_input % 10_000 == 0 {
        int_input as f64 / 100_000.0
    } else {
        ((int_input / 10_000) + 1) as f64 / 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_score_buckets() {
        assert_eq!(severity_from_score(9.8), Severity::Critical);
        assert_eq!(severity_from_score(9.0), Severity::Critical);
        assert_eq!(severity_from_score(8.9), Severity::High);
        assert_eq!(severity_from_score(7.0), Severity::High);
        assert_eq!(severity_from_score(6.9), Severity::Moderate);
        assert_eq!(severity_from_score(4.0), Severity::Moderate);
        assert_eq!(severity_from_score(3.9), Severity::Low);
        assert_eq!(severity_from_score(0.0), Severity::Low);
        assert_eq!(severity_from_score(-1.0), Severity::Unknown);
        assert_eq!(severity_from_score(11.0), Severity::Unknown);
    }

    #[test]
    fn test_cvss3_base_score_known_vectors() {
        assert_eq!(
            cvss3_base_score("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"),
            Some(9.8)
        );
        assert_eq!(
            cvss3_base_score("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:C/C:H/I:H/A:H"),
            Some(10.0)
        );
        assert_eq!(
            cvss3_base_score("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N"),
            Some(7.5)
        );
        assert_eq!(
            cvss3_base_score("CVSS:3.0/AV:N/AC:L/PR:N/UI:R/S:U/C:L/I:L/A:N"),
            Some(5.4)
        );
        assert_eq!(
            cvss3_base_score("CVSS:3.1/AV:N/AC:H/PR:N/UI:N/S:U/C:H/I:N/A:N"),
            Some(5.9)
        );
    }

    #[test]
    fn test_cvss3_no_impact_is_zero() {
        assert_eq!(
            cvss3_base_score("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N"),
            Some(0.0)
        );
    }

    #[test]
    fn test_cvss3_rejects_other_versions_and_garbage() {
        assert_eq!(
            cvss3_base_score("CVSS:4.0/AV:N/AC:L/AT:N/PR:N/UI:N/VC:H/VI:H/VA:H/SC:N/SI:N/SA:N"),
            None
        );
        assert_eq!(cvss3_base_score("CVSS:3.1/AV:N"), None);
        assert_eq!(cvss3_base_score("not a vector"), None);
    }

    #[test]
    fn test_parse_cvss_score() {
        assert_eq!(parse_cvss_score("9.8"), Some(Severity::Critical));
        assert_eq!(
            parse_cvss_score("CVSS:3.1/AV:L/AC:H/PR:L/UI:R/S:U/C:L/I:N/A:N"),
            Some(Severity::Low)
        );
        assert_eq!(parse_cvss_score("n/a"), None);
    }

    #[test]
    fn test_severity_from_label() {
        assert_eq!(severity_from_label("CRITICAL"), Severity::Critical);
        assert_eq!(severity_from_label("moderate"), Severity::Moderate);
        assert_eq!(severity_from_label("Medium"), Severity::Moderate);
        assert_eq!(severity_from_label("info"), Severity::Low);
        assert_eq!(severity_from_label("whatever"), Severity::Unknown);
    }
}
