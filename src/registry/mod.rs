//! Pattern registry: detector lookup, priority, enrichment and gating.
//!
//! ## Contract
//!
//! ```text
//! run_with_priority_selection(ctx) =
//!     select_highest_priority(map(apply_gate_enforcement, run(ctx)))
//! ```
//!
//! - `run` executes detectors in pattern-id order and fails fast: any
//!   detector error aborts the run with the failing pattern id attached
//! - Each finding is enriched once: empty `rule_basis` is filled from the
//!   loaded citation map, empty `break_triggers` gets the smallest trigger id
//!   the pattern is exposed to
//! - Gate enforcement demotes findings without a valid citation
//! - Selection ignores suppressed findings and is independent of input order
//!
//! The registry is an explicit value. Build one, load its citation map, and
//! pass it by reference; there is no process-wide instance.

pub mod gate;

pub use gate::{apply_gate_enforcement, valid_citation_count, GATE_SUPPRESSION_REASON};

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::detectors::{Detector, DetectorContext, DetectorError, PatternDetector};
use crate::types::{normalize_pattern_id, BreakTrigger, Finding, RuleBasisCitation};

/// Priority reported for patterns that are not registered.
pub const UNREGISTERED_PRIORITY: u32 = u32::MAX;

/// Registry failure.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A detector failed; the whole run is aborted.
    #[error("Detection failed for {pattern_id}: {source}")]
    DetectorFailed {
        /// Failing pattern.
        pattern_id: String,
        /// Underlying detector error.
        #[source]
        source: DetectorError,
    },
    /// Rule-basis map could not be read.
    #[error("Failed to read rule basis map {}: {source}", path.display())]
    RuleBasisIo {
        /// Map path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Rule-basis map is malformed.
    #[error("Invalid rule basis map: {0}")]
    RuleBasisMap(String),
}

/// Registered detector with its priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Detector.
    pub detector: Detector,
    /// Priority; lower wins.
    pub priority: u32,
}

#[derive(Debug, Deserialize)]
struct RuleBasisMapFile {
    #[serde(default)]
    rules: Vec<RuleBasisRule>,
}

#[derive(Debug, Deserialize)]
struct RuleBasisRule {
    pattern_id: String,
    #[serde(default)]
    citations: Vec<RuleBasisCitation>,
}

/// Result of a gated detection run.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutcome {
    /// Gated findings sorted by finding id.
    pub findings: Vec<Finding>,
    /// Finding id of the highest-priority alert-eligible finding.
    pub selected_finding_id: Option<String>,
}

impl DetectionOutcome {
    /// The selected finding, if any.
    pub fn selected(&self) -> Option<&Finding> {
        let id = self.selected_finding_id.as_deref()?;
        self.findings.iter().find(|f| f.finding_id == id)
    }

    /// Findings still alert-eligible after gating.
    pub fn alert_eligible_count(&self) -> usize {
        self.findings.iter().filter(|f| f.alert_eligible).count()
    }

    /// Findings demoted by the gate.
    pub fn suppressed_count(&self) -> usize {
        self.findings.iter().filter(|f| f.is_suppressed()).count()
    }
}

/// Detector registry.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    entries: BTreeMap<String, RegistryEntry>,
    rule_basis: BTreeMap<String, Vec<RuleBasisCitation>>,
}

impl PatternRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every detector at its default priority.
    pub fn with_default_detectors() -> Self {
        let mut registry = Self::new();
        for detector in Detector::all() {
            registry.register(detector);
        }
        registry
    }

    /// Register a detector at its default priority, replacing any previous one.
    pub fn register(&mut self, detector: Detector) {
        let priority = detector.default_priority();
        self.register_with_priority(detector, priority);
    }

    /// Register a detector with an explicit priority.
    pub fn register_with_priority(&mut self, detector: Detector, priority: u32) {
        let pattern_id = detector.pattern_id().to_string();
        debug!(pattern_id = %pattern_id, priority, "registered detector");
        self.entries.insert(pattern_id, RegistryEntry { detector, priority });
    }

    /// Remove a detector.
    pub fn unregister(&mut self, pattern_id: &str) -> Option<RegistryEntry> {
        let id = normalize_pattern_id(pattern_id).ok()?;
        self.entries.remove(&id)
    }

    /// Registered pattern ids, sorted.
    pub fn list_patterns(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Registered pattern ids whose detector is alert-eligible.
    pub fn list_alert_eligible_patterns(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.detector.alert_eligible())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Entry for a pattern.
    pub fn get(&self, pattern_id: &str) -> Option<&RegistryEntry> {
        let id = normalize_pattern_id(pattern_id).ok()?;
        self.entries.get(&id)
    }

    /// Priority of a pattern, or [`UNREGISTERED_PRIORITY`].
    pub fn priority_of(&self, pattern_id: &str) -> u32 {
        self.get(pattern_id).map_or(UNREGISTERED_PRIORITY, |e| e.priority)
    }

    /// Citations loaded for a pattern.
    pub fn citations_for(&self, pattern_id: &str) -> &[RuleBasisCitation] {
        normalize_pattern_id(pattern_id)
            .ok()
            .and_then(|id| self.rule_basis.get(&id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Load a rule-basis map from JSON text, replacing any previous map.
    ///
    /// Citations listed under several rules for one pattern are concatenated.
    pub fn load_rule_basis_json(&mut self, json: &str) -> Result<usize, RegistryError> {
        let file: RuleBasisMapFile =
            serde_json::from_str(json).map_err(|e| RegistryError::RuleBasisMap(e.to_string()))?;
        let mut map: BTreeMap<String, Vec<RuleBasisCitation>> = BTreeMap::new();
        for rule in file.rules {
            let id = normalize_pattern_id(&rule.pattern_id)
                .map_err(|e| RegistryError::RuleBasisMap(e.to_string()))?;
            map.entry(id).or_default().extend(rule.citations);
        }
        let total: usize = map.values().map(Vec::len).sum();
        info!(pattern_count = map.len(), citation_count = total, "loaded rule basis map");
        self.rule_basis = map;
        Ok(total)
    }

    /// Load a rule-basis map file.
    pub fn load_rule_basis_map(&mut self, path: &Path) -> Result<usize, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::RuleBasisIo {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_rule_basis_json(&text)
    }

    fn selected_ids(&self, subset: Option<&[&str]>) -> BTreeSet<String> {
        let Some(subset) = subset else {
            return self.entries.keys().cloned().collect();
        };
        let mut ids = BTreeSet::new();
        for raw in subset {
            match normalize_pattern_id(raw) {
                Ok(id) if self.entries.contains_key(&id) => {
                    ids.insert(id);
                }
                _ => warn!(pattern_id = %raw, "requested pattern is not registered; skipping"),
            }
        }
        ids
    }

    fn enrich(&self, entry: &RegistryEntry, mut finding: Finding) -> Finding {
        if finding.rule_basis.is_empty() {
            if let Some(citations) = self.rule_basis.get(&finding.pattern_id) {
                finding.rule_basis = citations.clone();
            }
        }
        if finding.break_triggers.is_empty() {
            finding.break_triggers = entry
                .detector
                .break_triggers()
                .iter()
                .min()
                .and_then(|id| BreakTrigger::from_catalog(id))
                .into_iter()
                .collect();
        }
        finding
    }

    /// Run detectors, optionally restricted to a subset of pattern ids.
    ///
    /// Findings come back enriched but not gated, sorted by finding id.
    pub fn run(&self, ctx: &DetectorContext<'_>, subset: Option<&[&str]>) -> Result<Vec<Finding>, RegistryError> {
        let mut findings = Vec::new();
        for id in self.selected_ids(subset) {
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            if !entry.detector.should_run(ctx) {
                debug!(pattern_id = %id, "detector preconditions not met; skipping");
                continue;
            }
            let produced = entry.detector.detect(ctx).map_err(|source| {
                error!(pattern_id = %id, error = %source, "detector failed; aborting run");
                RegistryError::DetectorFailed {
                    pattern_id: id.clone(),
                    source,
                }
            })?;
            debug!(pattern_id = %id, finding_count = produced.len(), "detector completed");
            findings.extend(produced.into_iter().map(|f| self.enrich(entry, f)));
        }
        findings.sort_by(|a, b| a.finding_id.cmp(&b.finding_id));
        Ok(findings)
    }

    /// Highest-priority alert-eligible finding.
    ///
    /// Ordered by `(priority, pattern_id, finding_id)`, so the result does
    /// not depend on the order of `findings`.
    pub fn select_highest_priority<'a>(&self, findings: &'a [Finding]) -> Option<&'a Finding> {
        findings
            .iter()
            .filter(|f| f.alert_eligible)
            .min_by(|a, b| {
                (self.priority_of(&a.pattern_id), &a.pattern_id, &a.finding_id).cmp(&(
                    self.priority_of(&b.pattern_id),
                    &b.pattern_id,
                    &b.finding_id,
                ))
            })
    }

    /// Run, gate every finding, and select the highest-priority survivor.
    pub fn run_with_priority_selection(
        &self,
        ctx: &DetectorContext<'_>,
        subset: Option<&[&str]>,
    ) -> Result<DetectionOutcome, RegistryError> {
        let findings: Vec<Finding> = self
            .run(ctx, subset)?
            .into_iter()
            .map(apply_gate_enforcement)
            .collect();
        let selected_finding_id = self
            .select_highest_priority(&findings)
            .map(|f| f.finding_id.clone());
        let outcome = DetectionOutcome {
            findings,
            selected_finding_id,
        };
        let patterns: BTreeSet<&str> = outcome.findings.iter().map(|f| f.pattern_id.as_str()).collect();
        info!(
            accession = %ctx.accession,
            finding_count = outcome.findings.len(),
            alert_eligible = outcome.alert_eligible_count(),
            suppressed = outcome.suppressed_count(),
            patterns = ?patterns,
            selected = ?outcome.selected_finding_id,
            "detection complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::*;
    use crate::detectors::{DuplicateFactsDetector, ExtensionAnchoringDetector, OrphanContextsDetector};
    use crate::types::{FilingModel, FindingStatus};

    const MAP: &str = r#"{
        "rules": [
            {"pattern_id": "P001", "citations": [
                {"source": "EFM", "citation": "6.5.12", "url": "https://www.sec.gov/efm",
                 "retrieved_at": "2026-01-31T15:38:00Z",
                 "sha256": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"}]},
            {"pattern_id": "XEW-P001", "citations": [
                {"source": "XBRL 2.1", "citation": "4.10", "title": "Duplicate items",
                 "retrieved_at": "2026-01-31T15:38:00Z",
                 "sha256": "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"}]},
            {"pattern_id": "P002", "citations": [
                {"source": "EFM", "citation": "6.6.27", "retrieved_at": "not-a-time", "sha256": "nope"}]}
        ]
    }"#;

    fn duplicate_model() -> FilingModel {
        let mut model = model_with(
            vec![
                numeric_fact(US_GAAP, "Revenues", "c1", "1000000", Some("0")),
                numeric_fact(US_GAAP, "Revenues", "c1_dup", "1500000", Some("0")),
                numeric_fact(ACME, "Widgets", "c1", "7", Some("0")),
            ],
            vec![context("c1", "2024-06-30"), context("c1_dup", "2024-06-30"), context("orphan", "2020-01-01")],
        );
        let c = concept(ACME, "Widgets", "xbrli:monetaryItemType", "instant");
        model.concepts.insert(c.qname.clark(), c);
        model
    }

    fn loaded_registry() -> PatternRegistry {
        let mut registry = PatternRegistry::with_default_detectors();
        registry.load_rule_basis_json(MAP).unwrap();
        registry
    }

    #[test]
    fn test_default_registry_listing() {
        let registry = PatternRegistry::with_default_detectors();
        assert_eq!(
            registry.list_patterns(),
            vec!["XEW-P001", "XEW-P002", "XEW-P004", "XEW-P005", "XEW-P007"]
        );
        assert!(!registry.list_alert_eligible_patterns().contains(&"XEW-P007"));
        assert_eq!(registry.priority_of("P001"), 1);
        assert_eq!(registry.priority_of("XEW-P003"), UNREGISTERED_PRIORITY);
    }

    #[test]
    fn test_rule_basis_citations_concatenate_across_rules() {
        let registry = loaded_registry();
        assert_eq!(registry.citations_for("P001").len(), 2);
        assert_eq!(registry.citations_for("XEW-P002").len(), 1);
        assert!(registry.citations_for("P005").is_empty());
    }

    #[test]
    fn test_malformed_rule_basis_map_is_error() {
        let mut registry = PatternRegistry::new();
        assert!(matches!(
            registry.load_rule_basis_json("{not json"),
            Err(RegistryError::RuleBasisMap(_))
        ));
        assert!(matches!(
            registry.load_rule_basis_json(r#"{"rules": [{"pattern_id": "P999"}]}"#),
            Err(RegistryError::RuleBasisMap(_))
        ));
        assert!(matches!(
            registry.load_rule_basis_map(Path::new("/nonexistent/map.json")),
            Err(RegistryError::RuleBasisIo { .. })
        ));
    }

    #[test]
    fn test_citation_without_source_loads_and_demotes() {
        let mut registry = PatternRegistry::with_default_detectors();
        let loaded = registry
            .load_rule_basis_json(
                r#"{"rules":[{"pattern_id":"P001","citations":[{"citation":"6.5.12","retrieved_at":"x","sha256":"y"}]}]}"#,
            )
            .unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(registry.citations_for("P001")[0].source, "");

        let model = duplicate_model();
        let ctx = DetectorContext::new(&model, accession());
        let outcome = registry.run_with_priority_selection(&ctx, Some(&["P001"])).unwrap();
        assert_eq!(outcome.findings[0].status, FindingStatus::Suppressed);
        assert!(!outcome.findings[0].alert_eligible);
        assert!(outcome.selected_finding_id.is_none());
    }

    #[test]
    fn test_run_enriches_findings() {
        let registry = loaded_registry();
        let model = duplicate_model();
        let ctx = DetectorContext::new(&model, accession());
        let findings = registry.run(&ctx, None).unwrap();

        let ids: Vec<&str> = findings.iter().map(|f| f.pattern_id.as_str()).collect();
        assert_eq!(ids, vec!["XEW-P001", "XEW-P002", "XEW-P007"]);
        let p001 = &findings[0];
        assert_eq!(p001.rule_basis.len(), 2);
        assert_eq!(p001.break_triggers.len(), 1);
        assert_eq!(p001.break_triggers[0].id, "XEW-BT001");
        assert_eq!(findings[1].break_triggers[0].id, "XEW-BT002");
    }

    #[test]
    fn test_subset_skips_unregistered() {
        let mut registry = loaded_registry();
        registry.unregister("P002");
        let model = duplicate_model();
        let ctx = DetectorContext::new(&model, accession());
        let findings = registry.run(&ctx, Some(&["P001", "P002", "bogus"])).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].pattern_id, "XEW-P001");
    }

    #[test]
    fn test_gated_selection() {
        let registry = loaded_registry();
        let model = duplicate_model();
        let ctx = DetectorContext::new(&model, accession());
        let outcome = registry.run_with_priority_selection(&ctx, None).unwrap();

        let selected = outcome.selected().unwrap();
        assert_eq!(selected.pattern_id, "XEW-P001");
        assert_eq!(selected.status, FindingStatus::Detected);

        let p002 = outcome.findings.iter().find(|f| f.pattern_id == "XEW-P002").unwrap();
        assert_eq!(p002.status, FindingStatus::Suppressed);
        assert!(!p002.alert_eligible);
        assert!(!p002.instances.is_empty());
        assert_eq!(outcome.alert_eligible_count(), 1);
    }

    #[test]
    fn test_without_citation_map_nothing_is_selected() {
        let registry = PatternRegistry::with_default_detectors();
        let model = duplicate_model();
        let ctx = DetectorContext::new(&model, accession());
        let outcome = registry.run_with_priority_selection(&ctx, None).unwrap();
        assert!(outcome.selected_finding_id.is_none());
        assert_eq!(outcome.suppressed_count(), outcome.findings.len());
    }

    #[test]
    fn test_priority_override_changes_selection() {
        let mut registry = loaded_registry();
        registry.register_with_priority(Detector::DuplicateFacts(DuplicateFactsDetector), 10);
        registry.register_with_priority(Detector::ExtensionAnchoring(ExtensionAnchoringDetector), 1);
        let findings = vec![
            Finding::new("F-1", "XEW-P001", "dup", true),
            Finding::new("F-2", "XEW-P002", "anchor", true),
        ];
        assert_eq!(registry.select_highest_priority(&findings).unwrap().pattern_id, "XEW-P002");
        registry.register(Detector::OrphanContexts(OrphanContextsDetector));
        assert_eq!(registry.priority_of("P007"), 5);
    }
}
