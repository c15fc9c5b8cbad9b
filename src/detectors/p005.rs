//! XEW-P005: inconsistent taxonomy references.

use regex_lite::Regex;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use super::{single_finding, DetectorContext, DetectorError, PatternDetector};
use crate::canonical::p005_signature;
use crate::types::identifiers::static_regex;
use crate::types::{Finding, Instance};

const MECHANISM: &str = "Schema references, declared imports and the namespaces facts actually use \
disagree, so the DTS a validator assembles depends on which reference it trusts.";
const WHY_NOT_FATAL_YET: &str = "Validators tolerate these inconsistencies while the referenced taxonomies \
remain available; stricter schema validation or a taxonomy retirement would expose them.";

/// XEW-P005 detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaxonomyReferencesDetector;

fn quoted_list<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    let quoted: Vec<String> = items.into_iter().map(|i| format!("'{i}'")).collect();
    format!("[{}]", quoted.join(", "))
}

/// Namespace bases carrying more than one dated version.
fn mixed_versions(namespaces: &BTreeSet<String>) -> BTreeMap<String, BTreeSet<String>> {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    let re = static_regex(&VERSION, r"/(\d{4}-\d{2}-\d{2})$");
    let mut by_base: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for ns in namespaces {
        if let Some(caps) = re.captures(ns) {
            if let (Some(whole), Some(version)) = (caps.get(0), caps.get(1)) {
                by_base
                    .entry(ns[..whole.start()].to_string())
                    .or_default()
                    .insert(version.as_str().to_string());
            }
        }
    }
    by_base.retain(|_, versions| versions.len() > 1);
    by_base
}

impl PatternDetector for TaxonomyReferencesDetector {
    fn pattern_id(&self) -> &'static str {
        "XEW-P005"
    }

    fn pattern_name(&self) -> &'static str {
        "Inconsistent Taxonomy References"
    }

    fn default_priority(&self) -> u32 {
        4
    }

    fn break_triggers(&self) -> &'static [&'static str] {
        &["XEW-BT003", "XEW-BT004"]
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let model = ctx.model;
        let schema_refs = model.normalized_schema_refs();
        let fact_namespaces: BTreeSet<String> = model
            .facts
            .iter()
            .map(|f| f.concept.namespace.clone())
            .filter(|ns| !ns.is_empty())
            .collect();
        let declared: BTreeSet<String> = model
            .declared_namespaces
            .iter()
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty())
            .collect();
        let namespaces: Vec<String> = fact_namespaces.iter().cloned().collect();

        let mut issues: Vec<(&str, String)> = Vec::new();
        if !declared.is_empty() {
            let missing: Vec<&String> = fact_namespaces.difference(&declared).collect();
            if !missing.is_empty() {
                issues.push((
                    "namespace_schema_ref_mismatch",
                    format!("namespaces_in_facts_not_declared_in_schema_imports={}", quoted_list(missing)),
                ));
            }
        }
        let mixed = mixed_versions(&fact_namespaces);
        if !mixed.is_empty() {
            let details = mixed
                .iter()
                .map(|(base, versions)| format!("{base} versions={}", quoted_list(versions)))
                .collect::<Vec<_>>()
                .join("; ");
            issues.push(("mixed_taxonomy_versions", details));
        }

        let mut instances = Vec::with_capacity(issues.len());
        for (code, details) in issues {
            let signature = p005_signature(code, &schema_refs, &namespaces)?;
            let data = json!({
                "issue_code": code,
                "schema_refs": schema_refs,
                "namespaces_in_facts": namespaces,
                "details": details,
            });
            instances.push(Instance::from_signature(&signature, "taxonomy_reference_issue", data));
        }

        single_finding(self, ctx, instances, MECHANISM, WHY_NOT_FATAL_YET)
    }
}
