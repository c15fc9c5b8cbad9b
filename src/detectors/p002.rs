//! XEW-P002: extension concept anchoring defects.

use serde_json::{json, Value};
use std::collections::BTreeSet;

use super::{fact_ref, fact_sort_key, qname_json, single_finding, DetectorContext, DetectorError, PatternDetector};
use crate::canonical::p002_signature;
use crate::types::{AnchorRelationship, Concept, Fact, FilingModel, Finding, Instance};

const MAX_FACT_EXAMPLES: usize = 3;

const MECHANISM: &str = "Extension concepts that are unanchored, or anchored to abstract, mismatched or \
other extension concepts, leave their relationship to the standard taxonomy ambiguous.";
const WHY_NOT_FATAL_YET: &str = "Anchoring is checked loosely today; stricter anchoring enforcement or a \
taxonomy update can turn these into validation errors.";

/// XEW-P002 detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtensionAnchoringDetector;

fn anchor_issue_codes(model: &FilingModel, concept: &Concept, anchors: &[&AnchorRelationship]) -> BTreeSet<&'static str> {
    let mut codes = BTreeSet::new();
    if anchors.is_empty() {
        codes.insert("unanchored");
        return codes;
    }
    for anchor in anchors {
        if let Some(target) = model.concept(&anchor.to) {
            if target.is_abstract {
                codes.insert("anchor_target_abstract");
            }
            if let (Some(a), Some(b)) = (&concept.period_type, &target.period_type) {
                if a != b {
                    codes.insert("period_type_mismatch");
                }
            }
            if let (Some(a), Some(b)) = (&concept.type_name, &target.type_name) {
                if a != b {
                    codes.insert("type_mismatch");
                }
            }
        }
        if !anchor.to.is_standard() {
            codes.insert("anchor_to_extension");
        }
    }
    codes
}

fn used_fact_examples<'m>(model: &'m FilingModel, concept: &Concept) -> Vec<&'m Fact> {
    let mut facts: Vec<&Fact> = model
        .facts
        .iter()
        .filter(|f| f.concept == concept.qname || f.concept.clark() == concept.qname.clark())
        .collect();
    facts.sort_by_key(|f| fact_sort_key(f));
    facts.truncate(MAX_FACT_EXAMPLES);
    facts
}

impl PatternDetector for ExtensionAnchoringDetector {
    fn pattern_id(&self) -> &'static str {
        "XEW-P002"
    }

    fn pattern_name(&self) -> &'static str {
        "Extension Concept Anchoring Defects"
    }

    fn default_priority(&self) -> u32 {
        2
    }

    fn break_triggers(&self) -> &'static [&'static str] {
        &["XEW-BT002", "XEW-BT003", "XEW-BT004"]
    }

    fn should_run(&self, ctx: &DetectorContext<'_>) -> bool {
        ctx.model.concepts.values().any(|c| !c.qname.is_standard())
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let model = ctx.model;
        let mut instances = Vec::new();

        for concept in model.concepts.values().filter(|c| !c.qname.is_standard()) {
            let clark = concept.qname.clark();
            let anchors: Vec<&AnchorRelationship> = model
                .anchor_relationships
                .iter()
                .filter(|r| r.is_anchoring() && r.from.clark() == clark)
                .collect();
            let codes = anchor_issue_codes(model, concept, &anchors);
            if codes.is_empty() {
                continue;
            }
            let examples = used_fact_examples(model, concept);
            if examples.is_empty() {
                continue;
            }

            let code_list: Vec<&str> = codes.into_iter().collect();
            let signature = p002_signature(&clark, &code_list)?;
            let mut data = json!({
                "extension_concept": qname_json(&concept.qname),
                "issue_codes": code_list,
                "used_fact_examples": examples.iter().map(|f| fact_ref(f)).collect::<Vec<Value>>(),
            });
            if !anchors.is_empty() {
                let described: BTreeSet<(String, String)> = anchors
                    .iter()
                    .map(|a| (a.arcrole.clone(), a.to.clark()))
                    .collect();
                data["anchors"] = described
                    .into_iter()
                    .map(|(arcrole, target)| json!({"arcrole": arcrole, "target_concept": target}))
                    .collect::<Vec<Value>>()
                    .into();
            }
            instances.push(Instance::from_signature(&signature, "extension_anchoring_issue", data));
        }

        single_finding(self, ctx, instances, MECHANISM, WHY_NOT_FATAL_YET)
    }
}
