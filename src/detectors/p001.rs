//! XEW-P001: duplicate facts with equivalent context and unit.
//!
//! Facts are grouped by canonical signature, so two contexts with different
//! ids but the same entity, period and dimensions collapse together. A group
//! becomes an instance only if its values actually conflict.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::numeric::{intervals_disjoint, Decimal, RoundingInterval};
use super::{fact_ref, fact_sort_key, qname_json, single_finding, ConflictMode, DetectorContext, DetectorError, PatternDetector};
use crate::canonical::{dimension_signature, p001_signature, period_signature, unit_signature, SignatureError};
use crate::types::{Fact, Finding, Instance};

const MECHANISM: &str = "The same concept is reported more than once for an equivalent entity, period, \
dimension set and unit, and the reported values disagree, so consumers cannot tell which value is authoritative.";
const WHY_NOT_FATAL_YET: &str = "EDGAR validation keys duplicates on context ids, so equivalent contexts with \
different ids or tolerated rounding differences pass today.";

/// XEW-P001 detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DuplicateFactsDetector;

#[derive(Debug, Clone, PartialEq, Eq)]
enum NormalizedValue {
    Nil,
    Number(Decimal),
    Text(String),
}

fn normalize(fact: &Fact) -> NormalizedValue {
    let raw = match (&fact.value, fact.is_nil) {
        (_, true) | (None, _) => return NormalizedValue::Nil,
        (Some(v), false) => v.trim(),
    };
    if fact.is_numeric() {
        if raw.is_empty() {
            return NormalizedValue::Nil;
        }
        return match Decimal::parse(raw) {
            Some(d) => NormalizedValue::Number(d),
            None => NormalizedValue::Text(raw.to_string()),
        };
    }
    NormalizedValue::Text(raw.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn strict_conflict(facts: &[&Fact]) -> bool {
    let mut values = facts.iter().map(|f| normalize(f));
    match values.next() {
        Some(first) => values.any(|v| v != first),
        None => false,
    }
}

/// `None` when the group cannot be compared by intervals.
fn rounded_conflict(facts: &[&Fact]) -> Option<bool> {
    let values: Vec<NormalizedValue> = facts.iter().map(|f| normalize(f)).collect();
    if values.iter().any(|v| matches!(v, NormalizedValue::Text(_))) {
        return None;
    }
    let nil_count = values.iter().filter(|v| **v == NormalizedValue::Nil).count();
    if nil_count == values.len() {
        return Some(false);
    }
    if nil_count > 0 {
        return Some(true);
    }
    let intervals = facts
        .iter()
        .zip(&values)
        .map(|(fact, value)| match value {
            NormalizedValue::Number(d) => {
                RoundingInterval::for_value(*d, fact.decimals.as_deref(), fact.precision.as_deref())
            }
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    intervals_disjoint(&intervals)
}

/// Whether the facts in a duplicate group disagree under the given mode.
pub(crate) fn values_conflict(facts: &[&Fact], mode: ConflictMode) -> bool {
    match mode {
        ConflictMode::Strict => strict_conflict(facts),
        ConflictMode::Rounded => rounded_conflict(facts).unwrap_or_else(|| strict_conflict(facts)),
    }
}

impl DuplicateFactsDetector {
    fn group_facts<'m>(&self, ctx: &DetectorContext<'m>) -> Result<BTreeMap<Vec<u8>, Vec<&'m Fact>>, DetectorError> {
        let model = ctx.model;
        let mut groups: BTreeMap<Vec<u8>, Vec<&'m Fact>> = BTreeMap::new();
        for fact in &model.facts {
            let Some(context) = model.context_of(fact) else {
                debug!(concept = %fact.concept.clark(), "skipping fact without resolvable context");
                continue;
            };
            let period = match period_signature(&context.period) {
                Ok(period) => period,
                Err(SignatureError::MissingPeriodDate { which }) => {
                    warn!(
                        concept = %fact.concept.clark(),
                        context_id = %context.id,
                        missing = which,
                        "skipping fact whose context period is incomplete"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let signature = p001_signature(
                &fact.concept.clark(),
                &context.entity_scheme,
                &context.entity_identifier,
                &period,
                &dimension_signature(&context.dimensions),
                &unit_signature(model, fact),
            )?;
            groups.entry(signature).or_default().push(fact);
        }
        Ok(groups)
    }

    fn instance_for(signature: &[u8], facts: &mut Vec<&Fact>) -> Instance {
        facts.sort_by_key(|f| fact_sort_key(f));
        let first = facts[0];
        let mut data = json!({
            "concept": qname_json(&first.concept),
            "context_ref": first.context_ref.clone().unwrap_or_default(),
            "fact_count": facts.len(),
            "facts": facts.iter().map(|f| fact_ref(f)).collect::<Vec<Value>>(),
            "issue_codes": ["duplicate_fact", "value_conflict"],
            "value_conflict": true,
        });
        if let Some(unit) = &first.unit_ref {
            data["unit_ref"] = Value::from(unit.clone());
        }
        Instance::from_signature(signature, "duplicate_fact_set", data)
    }
}

impl PatternDetector for DuplicateFactsDetector {
    fn pattern_id(&self) -> &'static str {
        "XEW-P001"
    }

    fn pattern_name(&self) -> &'static str {
        "Duplicate Facts With Equivalent Context/Unit"
    }

    fn default_priority(&self) -> u32 {
        1
    }

    fn break_triggers(&self) -> &'static [&'static str] {
        &["XEW-BT001", "XEW-BT004"]
    }

    fn should_run(&self, ctx: &DetectorContext<'_>) -> bool {
        ctx.model.facts.len() > 1
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let groups = self.group_facts(ctx)?;
        let mut instances = Vec::new();
        for (signature, mut facts) in groups {
            if facts.len() < 2 || !values_conflict(&facts, ctx.conflict_mode) {
                continue;
            }
            instances.push(Self::instance_for(&signature, &mut facts));
        }
        debug!(
            pattern_id = self.pattern_id(),
            conflict_mode = %ctx.conflict_mode,
            instance_count = instances.len(),
            "duplicate fact scan complete"
        );
        single_finding(self, ctx, instances, MECHANISM, WHY_NOT_FATAL_YET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::*;
    use crate::types::{DimensionMember, DimensionValue, Period, QName};

    fn run(facts: Vec<Fact>, mode: ConflictMode) -> Vec<Finding> {
        let model = model_with(
            facts,
            vec![context("c1", "2024-06-30"), context("c1_dup", "2024-06-30"), context("c2", "2023-06-30")],
        );
        let ctx = DetectorContext::new(&model, accession()).with_conflict_mode(mode);
        DuplicateFactsDetector.detect(&ctx).unwrap()
    }

    #[test]
    fn test_conflicting_duplicates_across_equivalent_contexts() {
        let findings = run(
            vec![
                numeric_fact(US_GAAP, "Revenues", "c1", "1000000", Some("0")),
                numeric_fact(US_GAAP, "Revenues", "c1_dup", "1500000", Some("0")),
            ],
            ConflictMode::Rounded,
        );
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.finding_id, "XEW-F-0000123456-24-000001-XEW-P001");
        assert_eq!(finding.instances.len(), 1);
        let instance = &finding.instances[0];
        assert_eq!(instance.kind, "duplicate_fact_set");
        assert!(instance.primary);
        assert_eq!(instance.data["fact_count"], 2);
        assert_eq!(instance.data["value_conflict"], true);
        assert_eq!(instance.data["unit_ref"], "usd");
        assert_eq!(instance.data["issue_codes"], json!(["duplicate_fact", "value_conflict"]));
    }

    #[test]
    fn test_consistent_duplicates_are_not_reported() {
        let findings = run(
            vec![
                numeric_fact(US_GAAP, "Revenues", "c1", "1000", Some("0")),
                numeric_fact(US_GAAP, "Revenues", "c1_dup", "1000.00", Some("2")),
            ],
            ConflictMode::Strict,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_rounded_mode_tolerates_rounding_differences() {
        let facts = vec![
            numeric_fact(US_GAAP, "Revenues", "c1", "1000000", Some("-6")),
            numeric_fact(US_GAAP, "Revenues", "c1_dup", "1234567", Some("0")),
        ];
        assert!(run(facts.clone(), ConflictMode::Rounded).is_empty());
        assert_eq!(run(facts, ConflictMode::Strict).len(), 1);
    }

    #[test]
    fn test_nil_against_value_conflicts_all_nil_does_not() {
        let mut nil_a = numeric_fact(US_GAAP, "Revenues", "c1", "", None);
        nil_a.is_nil = true;
        let mut nil_b = nil_a.clone();
        nil_b.context_ref = Some("c1_dup".into());
        assert!(run(vec![nil_a.clone(), nil_b], ConflictMode::Rounded).is_empty());

        let valued = numeric_fact(US_GAAP, "Revenues", "c1_dup", "5", Some("0"));
        assert_eq!(run(vec![nil_a, valued], ConflictMode::Rounded).len(), 1);
    }

    #[test]
    fn test_text_duplicates_compare_after_whitespace_collapse() {
        let a = text_fact(ACME, "PolicyText", "c1", "Revenue is  recognized\n when earned");
        let b = text_fact(ACME, "PolicyText", "c1_dup", " Revenue is recognized when earned ");
        assert!(run(vec![a.clone(), b], ConflictMode::Rounded).is_empty());

        let c = text_fact(ACME, "PolicyText", "c1_dup", "Revenue is deferred");
        assert_eq!(run(vec![a, c], ConflictMode::Rounded).len(), 1);
    }

    #[test]
    fn test_different_periods_are_not_duplicates() {
        let findings = run(
            vec![
                numeric_fact(US_GAAP, "Revenues", "c1", "1", Some("0")),
                numeric_fact(US_GAAP, "Revenues", "c2", "2", Some("0")),
            ],
            ConflictMode::Strict,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_dimension_order_does_not_split_groups() {
        let axis = |name: &str, member: &str| DimensionValue {
            dimension: QName::new(ACME, name),
            member: DimensionMember::Explicit(QName::new(ACME, member)),
        };
        let mut c1 = context("d1", "2024-06-30");
        c1.dimensions = vec![axis("AAxis", "A1"), axis("BAxis", "B1")];
        let mut c2 = context("d2", "2024-06-30");
        c2.dimensions = vec![axis("BAxis", "B1"), axis("AAxis", "A1")];
        let model = model_with(
            vec![
                numeric_fact(US_GAAP, "Revenues", "d1", "10", Some("0")),
                numeric_fact(US_GAAP, "Revenues", "d2", "20", Some("0")),
            ],
            vec![c1, c2],
        );
        let ctx = DetectorContext::new(&model, accession());
        assert_eq!(DuplicateFactsDetector.detect(&ctx).unwrap()[0].instances.len(), 1);
    }

    #[test]
    fn test_instance_id_independent_of_fact_order() {
        let facts = vec![
            numeric_fact(US_GAAP, "Revenues", "c1", "1", Some("0")),
            numeric_fact(US_GAAP, "Revenues", "c1_dup", "2", Some("0")),
        ];
        let mut reversed = facts.clone();
        reversed.reverse();
        let a = run(facts, ConflictMode::Strict);
        let b = run(reversed, ConflictMode::Strict);
        assert_eq!(a, b);
    }

    #[test]
    fn test_undated_context_is_skipped_not_fatal() {
        let mut undated = context("c_undated", "2024-06-30");
        undated.period = Period::Instant { date: None };
        let model = model_with(
            vec![
                numeric_fact(US_GAAP, "Revenues", "c1", "1000000", Some("0")),
                numeric_fact(US_GAAP, "Revenues", "c1_dup", "1500000", Some("0")),
                numeric_fact(US_GAAP, "Assets", "c_undated", "7", Some("0")),
            ],
            vec![context("c1", "2024-06-30"), context("c1_dup", "2024-06-30"), undated],
        );
        let findings = DuplicateFactsDetector
            .detect(&DetectorContext::new(&model, accession()))
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].instances.len(), 1);
        assert_eq!(findings[0].instances[0].data["fact_count"], 2);
    }

    #[test]
    fn test_unparseable_numbers_fall_back_to_strict() {
        let a = numeric_fact(US_GAAP, "Revenues", "c1", "1,000", Some("0"));
        let b = numeric_fact(US_GAAP, "Revenues", "c1_dup", "1000", Some("0"));
        assert_eq!(run(vec![a, b], ConflictMode::Rounded).len(), 1);
    }
}
