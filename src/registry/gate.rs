//! Provenance gate.
//!
//! A finding may only stay alert-eligible if at least one of its rule-basis
//! citations is valid. Otherwise it is demoted, never dropped: the instances
//! remain in the findings document for audit.

use tracing::{debug, info};

use crate::types::{Finding, FindingStatus};

/// Reason recorded on findings demoted by the gate.
pub const GATE_SUPPRESSION_REASON: &str = "gate_enforcement: no valid rule_basis citations";

/// Number of citations on the finding that pass validation.
pub fn valid_citation_count(finding: &Finding) -> usize {
    finding
        .rule_basis
        .iter()
        .filter(|citation| match citation.validate() {
            Ok(()) => true,
            Err(reason) => {
                debug!(
                    finding_id = %finding.finding_id,
                    source = %citation.source,
                    reason = %reason,
                    "citation rejected by gate"
                );
                false
            }
        })
        .count()
}

/// Demote a finding that has no valid citation.
pub fn apply_gate_enforcement(mut finding: Finding) -> Finding {
    if valid_citation_count(&finding) > 0 {
        return finding;
    }
    info!(
        finding_id = %finding.finding_id,
        pattern_id = %finding.pattern_id,
        citation_count = finding.rule_basis.len(),
        "finding suppressed by gate enforcement"
    );
    finding.alert_eligible = false;
    finding.status = FindingStatus::Suppressed;
    finding.human_review_required = true;
    finding.suppression_reason = Some(GATE_SUPPRESSION_REASON.to_string());
    finding
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Instance, RuleBasisCitation};
    use serde_json::json;

    fn finding_with(citations: Vec<RuleBasisCitation>) -> Finding {
        Finding::new("XEW-F-0000123456-24-000001-XEW-P001", "XEW-P001", "dup", true)
            .with_instances(vec![Instance::from_signature(b"v1|P001|x", "duplicate_fact_set", json!({}))])
            .with_rule_basis(citations)
    }

    fn good() -> RuleBasisCitation {
        RuleBasisCitation::new("EFM", "6.5.12", "2026-01-31T15:38:00Z", "c".repeat(64)).with_url("https://www.sec.gov")
    }

    #[test]
    fn test_valid_citation_passes_unchanged() {
        let finding = finding_with(vec![good()]);
        assert_eq!(apply_gate_enforcement(finding.clone()), finding);
    }

    #[test]
    fn test_no_citations_demotes_but_keeps_instances() {
        let gated = apply_gate_enforcement(finding_with(Vec::new()));
        assert!(!gated.alert_eligible);
        assert_eq!(gated.status, FindingStatus::Suppressed);
        assert!(gated.human_review_required);
        assert_eq!(gated.suppression_reason.as_deref(), Some(GATE_SUPPRESSION_REASON));
        assert_eq!(gated.instances.len(), 1);
    }

    #[test]
    fn test_only_invalid_citations_demote() {
        let mut bad = good();
        bad.sha256 = "xyz".into();
        let gated = apply_gate_enforcement(finding_with(vec![bad.clone()]));
        assert!(gated.is_suppressed());

        let mixed = apply_gate_enforcement(finding_with(vec![bad, good()]));
        assert!(!mixed.is_suppressed());
        assert_eq!(valid_citation_count(&mixed), 1);
    }
}
