//! Findings, instances and break triggers.
//!
//! A [`Finding`] is created by a detector and mutated exactly once by the
//! registry (rule-basis and break-trigger enrichment, then gate enforcement).
//! After that it is read-only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::citation::RuleBasisCitation;
use crate::canonical::instance_id;

/// Lifecycle status of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    /// Detected and eligible for review.
    Detected,
    /// Demoted by gate enforcement; kept for audit.
    Suppressed,
}

impl Default for FindingStatus {
    fn default() -> Self {
        Self::Detected
    }
}

impl fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detected => write!(f, "detected"),
            Self::Suppressed => write!(f, "suppressed"),
        }
    }
}

/// Condition under which a latent defect becomes a hard failure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BreakTrigger {
    /// Trigger id, e.g. `XEW-BT001`.
    pub id: String,
    /// One-line description.
    pub summary: String,
}

/// Known break triggers, sorted by id.
pub const BREAK_TRIGGER_CATALOG: &[(&str, &str)] = &[
    ("XEW-BT001", "Period Coincidence - Period changes expose hidden duplicates"),
    ("XEW-BT002", "Disclosure Reshaping - Presentation or dimensional restructuring changes how facts resolve"),
    ("XEW-BT003", "Taxonomy Refresh - New taxonomy releases change concept definitions and anchors"),
    ("XEW-BT004", "Validator Tightening - Stricter EDGAR or XBRL validation turns warnings into rejections"),
];

impl BreakTrigger {
    /// Look up a trigger in the catalog.
    pub fn from_catalog(id: &str) -> Option<Self> {
        BREAK_TRIGGER_CATALOG
            .iter()
            .find(|(known, _)| *known == id)
            .map(|(id, summary)| Self {
                id: (*id).to_string(),
                summary: (*summary).to_string(),
            })
    }
}

/// One concrete occurrence of a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// SHA-256 of the canonical signature.
    pub instance_id: String,
    /// Instance kind, e.g. `duplicate_fact_set`.
    pub kind: String,
    /// Whether this is primary evidence.
    pub primary: bool,
    /// Pattern-specific evidence.
    pub data: serde_json::Value,
}

impl Instance {
    /// Build an instance whose id is derived from its signature bytes.
    pub fn from_signature(signature: &[u8], kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            instance_id: instance_id(signature),
            kind: kind.into(),
            primary: true,
            data,
        }
    }
}

/// A detected pattern with its evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// `XEW-F-<accession>-<pattern>`.
    pub finding_id: String,
    /// `XEW-Pxxx`.
    pub pattern_id: String,
    /// Human-readable pattern name.
    pub pattern_name: String,
    /// Whether the finding may raise an alert.
    pub alert_eligible: bool,
    /// Detected or suppressed.
    pub status: FindingStatus,
    /// Why the finding was suppressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_reason: Option<String>,
    /// Whether a human must review before acting.
    pub human_review_required: bool,
    /// Conditions that would make the defect fatal.
    #[serde(default)]
    pub break_triggers: Vec<BreakTrigger>,
    /// Citations supporting the rule.
    #[serde(default)]
    pub rule_basis: Vec<RuleBasisCitation>,
    /// Instances, unique by id and sorted.
    #[serde(default)]
    pub instances: Vec<Instance>,
    /// How the defect arises.
    pub mechanism: String,
    /// Why filings still pass today.
    pub why_not_fatal_yet: String,
}

impl Finding {
    /// Create a detected finding with no evidence attached yet.
    pub fn new(
        finding_id: impl Into<String>,
        pattern_id: impl Into<String>,
        pattern_name: impl Into<String>,
        alert_eligible: bool,
    ) -> Self {
        Self {
            finding_id: finding_id.into(),
            pattern_id: pattern_id.into(),
            pattern_name: pattern_name.into(),
            alert_eligible,
            status: FindingStatus::Detected,
            suppression_reason: None,
            human_review_required: false,
            break_triggers: Vec::new(),
            rule_basis: Vec::new(),
            instances: Vec::new(),
            mechanism: String::new(),
            why_not_fatal_yet: String::new(),
        }
    }

    /// Set the mechanism and the reason the defect is not yet fatal.
    pub fn with_narrative(mut self, mechanism: impl Into<String>, why_not_fatal_yet: impl Into<String>) -> Self {
        self.mechanism = mechanism.into();
        self.why_not_fatal_yet = why_not_fatal_yet.into();
        self
    }

    /// Attach instances, collapsing duplicate ids and sorting by id.
    ///
    /// When two instances share an id the first one wins.
    pub fn with_instances(mut self, instances: impl IntoIterator<Item = Instance>) -> Self {
        let mut by_id: BTreeMap<String, Instance> = BTreeMap::new();
        for instance in self.instances.drain(..).chain(instances) {
            by_id.entry(instance.instance_id.clone()).or_insert(instance);
        }
        self.instances = by_id.into_values().collect();
        self
    }

    /// Attach break triggers.
    pub fn with_break_triggers(mut self, triggers: Vec<BreakTrigger>) -> Self {
        self.break_triggers = triggers;
        self
    }

    /// Attach citations.
    pub fn with_rule_basis(mut self, citations: Vec<RuleBasisCitation>) -> Self {
        self.rule_basis = citations;
        self
    }

    /// Instance ids in sorted order.
    pub fn instance_ids(&self) -> impl Iterator<Item = &str> {
        self.instances.iter().map(|i| i.instance_id.as_str())
    }

    /// Whether the finding survived gate enforcement.
    pub fn is_suppressed(&self) -> bool {
        self.status == FindingStatus::Suppressed
    }
}
