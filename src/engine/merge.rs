use crate::checker::{prioritize_links, NO_DESCRIPTION};
use crate::model::VulnerabilityReport;

/// Whether two reports describe the same vulnerability: same
/// `(package, version)` and a shared CVE ID, or, when neither carries a CVE
/// ID, the same source.
pub fn same_finding(a: &VulnerabilityReport, b: &VulnerabilityReport) -> bool {
    if a.key() != b.key() {
        return false;
    }

    if a.cve_ids.is_empty() && b.cve_ids.is_empty() {
        return a.source == b.source;
    }

    !a.cve_ids.is_disjoint(&b.cve_ids)
}

/// Collapses reports of the same finding into one.
///
/// The output never contains two reports for which [`same_finding`] holds,
/// so merging an already merged set returns it unchanged. First-seen order
/// is kept; the output is not sorted.
pub fn merge_reports(reports: Vec<VulnerabilityReport>) -> Vec<VulnerabilityReport> {
    let mut merged: Vec<VulnerabilityReport> = Vec::with_capacity(reports.len());

    for report in reports {
        match merged.iter().position(|existing| same_finding(existing, &report)) {
            Some(pos) => {
                absorb(&mut merged[pos], report);
                collapse_from(&mut merged, pos);
            }
            None => merged.push(report),
        }
    }

    merged
}

/// Folds later entries into `merged[pos]` once its widened CVE set makes
/// them the same finding.
fn collapse_from(merged: &mut Vec<VulnerabilityReport>, pos: usize) {
    let mut i = pos + 1;
    while i < merged.len() {
        if same_finding(&merged[pos], &merged[i]) {
            let later = merged.remove(i);
            absorb(&mut merged[pos], later);
            i = pos + 1;
        } else {
            i += 1;
        }
    }
}

/// Merges `other` into `target`. `target` is the earlier report and wins
/// every tie.
fn absorb(target: &mut VulnerabilityReport, other: VulnerabilityReport) {
    target.severity = target.severity.max(other.severity);
    target.cve_ids.extend(other.cve_ids);

    let mut links = std::mem::take(&mut target.advisory_links);
    links.extend(other.advisory_links);
    target.advisory_links = prioritize_links(links);

    if let Some(fixed) = other.fixed_versions {
        let versions = target.fixed_versions.get_or_insert_with(Vec::new);
        for version in fixed {
            if !versions.contains(&version) {
                versions.push(version);
            }
        }
    }
    if target.suggested_upgrade.is_none() {
        target.suggested_upgrade = other.suggested_upgrade;
    }
    if target.ecosystem.is_none() {
        target.ecosystem = other.ecosystem;
    }

    let placeholder = target.description.trim().is_empty() || target.description == NO_DESCRIPTION;
    if placeholder && !other.description.trim().is_empty() {
        target.description = other.description;
    }
}
