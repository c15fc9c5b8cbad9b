//! XEW-P004: type, unit and numeric attribute violations.
//!
//! | Issue code | Condition |
//! |------------|-----------|
//! | `missing_unit` | numeric fact without a unit |
//! | `invalid_decimals` | `decimals` not an integer, or negative (`INF` included) |
//! | `invalid_precision` | `precision` not an integer (`INF` included), or above 20 |
//! | `decimals_precision_conflict` | both attributes present |
//! | `unit_incompatible` | monetary type without a currency measure, or a pure/decimal/integer type with another unit |
//! | `non_numeric_with_unit` | non-numeric fact with a unit |

use serde_json::{json, Value};
use tracing::debug;

use super::{fact_ref, qname_json, single_finding, DetectorContext, DetectorError, PatternDetector};
use crate::canonical::{p004_signature, unit_signature};
use crate::types::{Fact, FilingModel, Finding, Instance};

const MAX_PRECISION: u32 = 20;

const MECHANISM: &str = "Facts carry type, unit or numeric attributes that contradict their concept \
declaration, so processors that enforce type checking read them differently or reject them.";
const WHY_NOT_FATAL_YET: &str = "Attribute checks are lenient today; stricter type enforcement or updated \
validation rules would make these blocking errors.";

/// XEW-P004 detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NumericTypingDetector;

fn decimals_invalid(raw: &str) -> bool {
    raw.trim().parse::<i64>().map_or(true, |d| d < 0)
}

fn precision_invalid(raw: &str) -> bool {
    raw.trim().parse::<i64>().map_or(true, |p| p > i64::from(MAX_PRECISION))
}

fn unit_incompatible(type_name: &str, measures: &[String]) -> bool {
    let type_name = type_name.to_ascii_lowercase();
    if type_name.contains("monetary") || type_name.contains("money") {
        return !measures
            .iter()
            .any(|m| m.contains("iso4217") || m.to_ascii_lowercase().contains("currency"));
    }
    if type_name.contains("decimal") || type_name.contains("integer") || type_name.contains("pure") {
        return measures.len() > 1 || measures.first().map_or(true, |m| !m.contains("pure"));
    }
    false
}

fn issue_codes(model: &FilingModel, fact: &Fact) -> Vec<&'static str> {
    let mut codes = Vec::new();
    if !fact.is_numeric {
        if fact.unit_ref.is_some() {
            codes.push("non_numeric_with_unit");
        }
        return codes;
    }
    if fact.unit_ref.is_none() {
        codes.push("missing_unit");
    }
    if fact.decimals.as_deref().is_some_and(decimals_invalid) {
        codes.push("invalid_decimals");
    }
    if fact.precision.as_deref().is_some_and(precision_invalid) {
        codes.push("invalid_precision");
    }
    if fact.decimals.is_some() && fact.precision.is_some() {
        codes.push("decimals_precision_conflict");
    }
    if let (Some(unit), Some(concept)) = (model.unit_of(fact), model.concept(&fact.concept)) {
        let measures: Vec<String> = unit.measures.iter().map(|m| m.clark()).collect();
        if concept
            .type_name
            .as_deref()
            .is_some_and(|t| unit_incompatible(t, &measures))
        {
            codes.push("unit_incompatible");
        }
    }
    codes
}

impl PatternDetector for NumericTypingDetector {
    fn pattern_id(&self) -> &'static str {
        "XEW-P004"
    }

    fn pattern_name(&self) -> &'static str {
        "Type/Unit/Numeric Attribute Violations"
    }

    fn default_priority(&self) -> u32 {
        3
    }

    fn break_triggers(&self) -> &'static [&'static str] {
        &["XEW-BT003", "XEW-BT004"]
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let model = ctx.model;
        let mut instances = Vec::new();

        for fact in &model.facts {
            let codes = issue_codes(model, fact);
            if codes.is_empty() {
                continue;
            }
            let Some(context_id) = fact.context_id() else {
                debug!(concept = %fact.concept.clark(), "dropping violation on fact without context");
                continue;
            };
            let unit = unit_signature(model, fact);
            let concept = model.concept(&fact.concept);
            for code in codes {
                let signature = p004_signature(&fact.concept.clark(), context_id, &unit, code)?;
                let mut data = json!({
                    "issue_code": code,
                    "fact": fact_ref(fact),
                });
                if let Some(type_name) = concept.and_then(|c| c.type_name.as_deref()) {
                    data["concept_type"] = Value::from(type_name);
                }
                if let Some(u) = model.unit_of(fact) {
                    data["unit_measures"] = u.measures.iter().map(qname_json).collect::<Vec<Value>>().into();
                }
                instances.push(Instance::from_signature(&signature, "fact_numeric_typing_issue", data));
            }
        }

        single_finding(self, ctx, instances, MECHANISM, WHY_NOT_FATAL_YET)
    }
}
