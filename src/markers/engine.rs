//! Snapshot extraction and the marker engine.
//!
//! A [`FilingSnapshot`] is the per-filing summary every marker compares.
//! History snapshots are extracted from prior filing models once, then the
//! engine runs all five markers against the current filing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::{
    detect_anchoring_retrofit_marker, detect_context_model_rewrite_marker, detect_duplicate_cleanup_from_findings,
    detect_extension_refactor_marker, detect_taxonomy_refresh_marker, m005, sort_markers, Marker, MarkerError,
    MarkerThresholds,
};
use crate::config::DEFAULT_EXAMPLE_LIMIT;
use crate::detectors::{ConflictMode, DetectorContext};
use crate::registry::PatternRegistry;
use crate::types::{Accession, DimensionMember, Finding, FilingModel};

/// Structural summary of one filing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilingSnapshot {
    /// Accession as supplied; validated during prior-snapshot selection.
    pub accession: String,
    /// Trimmed, deduplicated, sorted schema refs.
    pub schema_refs: Vec<String>,
    /// Clark names of extension concepts.
    pub extension_qnames: Vec<String>,
    /// Extension concepts with an anchoring relationship.
    pub anchored_qnames: Vec<String>,
    /// Number of contexts.
    pub context_count: usize,
    /// One `dim=member|dim=member` signature per distinct dimensional qualifier set.
    pub dimension_member_signatures: Vec<String>,
    /// XEW-P001 instance ids.
    pub duplicate_signature_ids: Vec<String>,
}

impl FilingSnapshot {
    /// Empty snapshot for an accession.
    pub fn new(accession: impl Into<String>) -> Self {
        Self {
            accession: accession.into(),
            ..Self::default()
        }
    }

    /// Summarize a filing model without running any detector.
    ///
    /// `duplicate_signature_ids` is left empty. Use this for the current
    /// filing, whose duplicates [`MarkerEngine::compute`] reads from findings.
    pub fn structural(accession: &str, model: &FilingModel) -> Self {
        let extensions = model.extension_qnames();
        let anchored: BTreeSet<String> = model
            .anchor_relationships
            .iter()
            .filter(|r| r.is_anchoring())
            .map(|r| r.from.clark())
            .filter(|q| extensions.contains(q))
            .collect();

        Self {
            accession: accession.trim().to_string(),
            schema_refs: model.normalized_schema_refs(),
            extension_qnames: extensions.into_iter().collect(),
            anchored_qnames: anchored.into_iter().collect(),
            context_count: model.contexts.len(),
            dimension_member_signatures: dimension_member_signatures(model),
            duplicate_signature_ids: Vec::new(),
        }
    }

    /// Summarize a filing model.
    ///
    /// Duplicate signatures come from running the registry's XEW-P001
    /// detector on the model. A detection failure or an unparseable accession
    /// leaves them empty rather than failing the snapshot.
    pub fn from_model(
        accession: &str,
        model: &FilingModel,
        registry: &PatternRegistry,
        conflict_mode: ConflictMode,
    ) -> Self {
        let duplicate_signature_ids = match Accession::parse(accession) {
            Ok(parsed) => {
                let ctx = DetectorContext::new(model, parsed).with_conflict_mode(conflict_mode);
                match registry.run(&ctx, Some(&[m005::DUPLICATE_PATTERN_ID][..])) {
                    Ok(findings) => m005::duplicate_signature_ids(&findings),
                    Err(e) => {
                        warn!(accession, error = %e, "duplicate detection failed for history filing");
                        Vec::new()
                    }
                }
            }
            Err(_) => {
                warn!(accession, "history filing has an invalid accession; skipping duplicate detection");
                Vec::new()
            }
        };

        let snapshot = Self {
            duplicate_signature_ids,
            ..Self::structural(accession, model)
        };
        debug!(
            accession = %snapshot.accession,
            schema_refs = snapshot.schema_refs.len(),
            extensions = snapshot.extension_qnames.len(),
            contexts = snapshot.context_count,
            duplicates = snapshot.duplicate_signature_ids.len(),
            "extracted filing snapshot"
        );
        snapshot
    }
}

/// Distinct dimensional qualifier sets across the model's contexts.
pub fn dimension_member_signatures(model: &FilingModel) -> Vec<String> {
    let mut signatures = BTreeSet::new();
    for context in model.contexts.values().filter(|c| !c.dimensions.is_empty()) {
        let mut pairs: Vec<String> = context
            .dimensions
            .iter()
            .map(|dv| {
                let member = match &dv.member {
                    DimensionMember::Explicit(q) => q.clark(),
                    DimensionMember::Typed(raw) => raw.trim().to_string(),
                };
                format!("{}={member}", dv.dimension.clark())
            })
            .collect();
        pairs.sort();
        pairs.dedup();
        signatures.insert(pairs.join("|"));
    }
    signatures.into_iter().collect()
}

/// Runs every marker for one filing.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerEngine {
    thresholds: MarkerThresholds,
    max_examples: usize,
}

impl Default for MarkerEngine {
    fn default() -> Self {
        Self::new(MarkerThresholds::default(), DEFAULT_EXAMPLE_LIMIT)
    }
}

impl MarkerEngine {
    /// Engine with explicit thresholds and example cap.
    pub fn new(thresholds: MarkerThresholds, max_examples: usize) -> Self {
        Self {
            thresholds,
            max_examples,
        }
    }

    /// Thresholds in use.
    pub fn thresholds(&self) -> &MarkerThresholds {
        &self.thresholds
    }

    /// Compute all markers for `current` against `history`.
    ///
    /// The current filing's duplicate signatures are taken from `findings`.
    /// Output is sorted by `(marker_id, from_accession, to_accession)`.
    pub fn compute(
        &self,
        current: &FilingSnapshot,
        history: &[FilingSnapshot],
        findings: &[Finding],
    ) -> Result<Vec<Marker>, MarkerError> {
        let t = &self.thresholds;
        let n = self.max_examples;
        let accession = current.accession.as_str();

        let candidates = [
            detect_taxonomy_refresh_marker(accession, &current.schema_refs, history, &t.taxonomy_refresh, n)?,
            detect_extension_refactor_marker(accession, &current.extension_qnames, history, &t.extension_refactor, n)?,
            detect_anchoring_retrofit_marker(
                accession,
                &current.extension_qnames,
                &current.anchored_qnames,
                history,
                &t.anchoring_retrofit,
                n,
            )?,
            detect_context_model_rewrite_marker(
                accession,
                current.context_count,
                &current.dimension_member_signatures,
                history,
                &t.context_model_rewrite,
                n,
            )?,
            detect_duplicate_cleanup_from_findings(accession, findings, history, &t.duplicate_cleanup, n)?,
        ];

        let mut markers: Vec<Marker> = candidates.into_iter().flatten().collect();
        sort_markers(&mut markers);
        info!(
            accession,
            history_count = history.len(),
            marker_count = markers.len(),
            markers = ?markers.iter().map(|m| m.marker_id.as_str()).collect::<Vec<_>>(),
            "marker computation complete"
        );
        Ok(markers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::*;
    use crate::markers::test_support::{names, CURRENT, PRIOR};
    use crate::types::{AnchorRelationship, DimensionValue, QName};

    fn dimensional_context(id: &str, member: &str) -> crate::types::Context {
        let mut c = context(id, "2024-06-30");
        c.dimensions = vec![DimensionValue {
            dimension: QName::new(US_GAAP, "StatementBusinessSegmentsAxis"),
            member: DimensionMember::Explicit(QName::new(ACME, member)),
        }];
        c
    }

    #[test]
    fn test_snapshot_from_model() {
        let mut model = model_with(
            vec![
                numeric_fact(US_GAAP, "Assets", "c1", "100", Some("0")),
                numeric_fact(US_GAAP, "Assets", "c1", "150", Some("0")),
            ],
            vec![context("c1", "2024-06-30"), dimensional_context("d1", "Widgets"), dimensional_context("d2", "Widgets")],
        );
        for name in ["Widgets", "Gadgets"] {
            let c = concept(ACME, name, "xbrli:monetaryItemType", "instant");
            model.concepts.insert(c.qname.clark(), c);
        }
        model.anchor_relationships.push(AnchorRelationship {
            arcrole: crate::types::ANCHORING_ARCROLES[0].to_string(),
            from: QName::new(ACME, "Widgets"),
            to: QName::new(US_GAAP, "Revenues"),
        });
        model.schema_refs = vec!["b.xsd".into(), " a.xsd".into(), "b.xsd".into()];

        let registry = PatternRegistry::with_default_detectors();
        let snapshot = FilingSnapshot::from_model(CURRENT, &model, &registry, ConflictMode::Rounded);
        assert_eq!(snapshot.schema_refs, vec!["a.xsd", "b.xsd"]);
        assert_eq!(snapshot.extension_qnames.len(), 2);
        assert_eq!(snapshot.anchored_qnames, vec![format!("{{{ACME}}}Widgets")]);
        assert_eq!(snapshot.context_count, 3);
        assert_eq!(snapshot.dimension_member_signatures.len(), 1);
        assert_eq!(snapshot.duplicate_signature_ids.len(), 1);
    }

    #[test]
    fn test_structural_snapshot_skips_duplicate_detection() {
        let model = model_with(
            vec![
                numeric_fact(US_GAAP, "Assets", "c1", "100", Some("0")),
                numeric_fact(US_GAAP, "Assets", "c1", "150", Some("0")),
            ],
            vec![context("c1", "2024-06-30")],
        );
        let registry = PatternRegistry::with_default_detectors();
        let full = FilingSnapshot::from_model(CURRENT, &model, &registry, ConflictMode::Rounded);
        let structural = FilingSnapshot::structural(CURRENT, &model);
        assert!(structural.duplicate_signature_ids.is_empty());
        assert_eq!(full.duplicate_signature_ids.len(), 1);
        assert_eq!(
            FilingSnapshot {
                duplicate_signature_ids: Vec::new(),
                ..full
            },
            structural
        );
    }

    #[test]
    fn test_invalid_history_accession_yields_no_duplicates() {
        let model = model_with(
            vec![
                numeric_fact(US_GAAP, "Assets", "c1", "100", Some("0")),
                numeric_fact(US_GAAP, "Assets", "c1", "150", Some("0")),
            ],
            vec![context("c1", "2024-06-30")],
        );
        let registry = PatternRegistry::with_default_detectors();
        let snapshot = FilingSnapshot::from_model("garbage", &model, &registry, ConflictMode::Rounded);
        assert!(snapshot.duplicate_signature_ids.is_empty());
        assert_eq!(snapshot.context_count, 1);
    }

    #[test]
    fn test_engine_sorted_output() {
        let mut prior = FilingSnapshot::new(PRIOR);
        prior.schema_refs = vec!["acme-2023.xsd".into()];
        prior.context_count = 100;
        prior.duplicate_signature_ids = names("sig", 0..50);

        let mut current = FilingSnapshot::new(CURRENT);
        current.schema_refs = vec!["acme-2024.xsd".into()];
        current.context_count = 200;

        let markers = MarkerEngine::default().compute(&current, &[prior], &[]).unwrap();
        let ids: Vec<&str> = markers.iter().map(|m| m.marker_id.as_str()).collect();
        assert_eq!(ids, vec!["XEW-M001", "XEW-M004", "XEW-M005"]);
    }

    #[test]
    fn test_engine_without_history() {
        let current = FilingSnapshot::new(CURRENT);
        assert!(MarkerEngine::default().compute(&current, &[], &[]).unwrap().is_empty());
        let bad = FilingSnapshot::new("bad");
        assert!(MarkerEngine::default().compute(&bad, &[], &[]).is_err());
    }
}
