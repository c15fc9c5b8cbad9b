//! XEW-P007: orphaned context definitions.
//!
//! Contexts that no fact references are informational. Orphans that are
//! semantically identical (same entity, period and dimensions) collapse into
//! one instance listing every context id.

use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use super::{single_finding, DetectorContext, DetectorError, PatternDetector};
use crate::canonical::{dimension_signature, p007_signature, period_signature, SignatureError};
use crate::types::{Context, Finding, Instance};

const MECHANISM: &str = "Contexts are declared but never referenced by a fact, usually left behind \
when disclosures were removed or restructured.";
const WHY_NOT_FATAL_YET: &str = "Unused contexts are valid XBRL; they only become a problem when a \
restructuring reuses them with different meaning.";

/// XEW-P007 detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanContextsDetector;

impl PatternDetector for OrphanContextsDetector {
    fn pattern_id(&self) -> &'static str {
        "XEW-P007"
    }

    fn pattern_name(&self) -> &'static str {
        "Orphaned Context Definitions"
    }

    fn alert_eligible(&self) -> bool {
        false
    }

    fn default_priority(&self) -> u32 {
        5
    }

    fn break_triggers(&self) -> &'static [&'static str] {
        &["XEW-BT002", "XEW-BT004"]
    }

    fn should_run(&self, ctx: &DetectorContext<'_>) -> bool {
        !ctx.model.contexts.is_empty()
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let model = ctx.model;
        let referenced: BTreeSet<&str> = model.facts.iter().filter_map(|f| f.context_id()).collect();

        let mut groups: BTreeMap<Vec<u8>, (Vec<&Context>, String, String)> = BTreeMap::new();
        for context in model.contexts.values().filter(|c| !referenced.contains(c.id.as_str())) {
            let period = match period_signature(&context.period) {
                Ok(period) => period,
                Err(SignatureError::MissingPeriodDate { which }) => {
                    warn!(context_id = %context.id, missing = which, "skipping orphan context with incomplete period");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let dims = dimension_signature(&context.dimensions);
            let signature = p007_signature(&context.entity_scheme, &context.entity_identifier, &period, &dims)?;
            groups
                .entry(signature)
                .or_insert_with(|| (Vec::new(), period, dims))
                .0
                .push(context);
        }

        let instances = groups
            .into_iter()
            .map(|(signature, (contexts, period, dims))| {
                let first = contexts[0];
                let data = json!({
                    "issue_code": "unused_context",
                    "context_refs": contexts.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
                    "entity": {"scheme": first.entity_scheme, "identifier": first.entity_identifier},
                    "period": period,
                    "dimensions": dims,
                });
                let mut instance = Instance::from_signature(&signature, "orphan_context", data);
                instance.primary = false;
                instance
            })
            .collect();

        single_finding(self, ctx, instances, MECHANISM, WHY_NOT_FATAL_YET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::*;

    #[test]
    fn test_orphans_grouped_by_signature() {
        let model = model_with(
            vec![numeric_fact(US_GAAP, "Assets", "used", "1", Some("0"))],
            vec![
                context("used", "2024-06-30"),
                context("orphan_a", "2023-06-30"),
                context("orphan_b", "2023-06-30"),
                context("orphan_c", "2022-06-30"),
            ],
        );
        let findings = OrphanContextsDetector
            .detect(&DetectorContext::new(&model, accession()))
            .unwrap();
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert!(!finding.alert_eligible);
        assert_eq!(finding.instances.len(), 2);
        let grouped = finding
            .instances
            .iter()
            .find(|i| i.data["context_refs"].as_array().unwrap().len() == 2)
            .unwrap();
        assert_eq!(grouped.data["context_refs"], json!(["orphan_a", "orphan_b"]));
        assert_eq!(grouped.data["period"], "instant:2023-06-30");
    }

    #[test]
    fn test_undated_orphan_is_skipped() {
        let mut undated = context("orphan_undated", "2023-06-30");
        undated.period = crate::types::Period::Instant { date: None };
        let model = model_with(
            vec![numeric_fact(US_GAAP, "Assets", "used", "1", Some("0"))],
            vec![context("used", "2024-06-30"), context("orphan_a", "2023-06-30"), undated],
        );
        let findings = OrphanContextsDetector
            .detect(&DetectorContext::new(&model, accession()))
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].instances.len(), 1);
        assert_eq!(findings[0].instances[0].data["context_refs"], json!(["orphan_a"]));
    }

    #[test]
    fn test_no_orphans() {
        let model = model_with(
            vec![numeric_fact(US_GAAP, "Assets", "c1", "1", Some("0"))],
            vec![context("c1", "2024-06-30")],
        );
        assert!(OrphanContextsDetector
            .detect(&DetectorContext::new(&model, accession()))
            .unwrap()
            .is_empty());
    }
}
