//! XEW-M005: duplicate cleanup.
//!
//! A sharp drop in XEW-P001 duplicate-fact signatures between filings.
//! Clean-ups are worth surfacing because the removed duplicates often took
//! their conflicting values with them, and downstream consumers who relied on
//! either value see a silent restatement.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    examples, normalize_set, ratio, round6, select_prior_snapshot, FilingSnapshot, Marker, MarkerError,
    MarkerEvidence,
};
use crate::types::{Accession, Finding};

/// Marker id.
pub const MARKER_ID: &str = "XEW-M005";

/// Pattern whose instance ids make up the duplicate signature set.
pub const DUPLICATE_PATTERN_ID: &str = "XEW-P001";

/// XEW-M005 thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateCleanupThresholds {
    /// Minimum `drop / previous`.
    pub min_drop_ratio: f64,
    /// Minimum absolute drop.
    pub min_drop_count: usize,
    /// Minimum duplicate signatures in the prior filing.
    pub min_previous_count: usize,
}

impl Default for DuplicateCleanupThresholds {
    fn default() -> Self {
        Self {
            min_drop_ratio: 0.5,
            min_drop_count: 10,
            min_previous_count: 20,
        }
    }
}

/// XEW-M005 evidence.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCleanupEvidence {
    pub previous_duplicate_signature_count: usize,
    pub current_duplicate_signature_count: usize,
    pub drop_count: usize,
    pub drop_ratio: f64,
    pub thresholds: DuplicateCleanupThresholds,
    pub removed_signature_count: usize,
    pub removed_signature_examples: Vec<String>,
}

/// Compare duplicate signature ids against the most recent prior snapshot.
pub fn detect_duplicate_cleanup_marker(
    current_accession: &str,
    current_signature_ids: &[String],
    history: &[FilingSnapshot],
    thresholds: &DuplicateCleanupThresholds,
    max_examples: usize,
) -> Result<Option<Marker>, MarkerError> {
    let current = Accession::parse(current_accession)?;
    let Some((prior, previous)) = select_prior_snapshot(history, &current) else {
        return Ok(None);
    };

    let prev = normalize_set(&prior.duplicate_signature_ids);
    let curr = normalize_set(current_signature_ids);
    if prev.len() < thresholds.min_previous_count {
        debug!(marker_id = MARKER_ID, previous = prev.len(), "baseline too small");
        return Ok(None);
    }

    let drop = prev.len().saturating_sub(curr.len());
    if drop == 0 {
        return Ok(None);
    }
    let drop_ratio = ratio(drop, prev.len());
    if drop < thresholds.min_drop_count || drop_ratio < thresholds.min_drop_ratio {
        return Ok(None);
    }

    let removed: Vec<&String> = prev.difference(&curr).collect();
    let evidence = DuplicateCleanupEvidence {
        previous_duplicate_signature_count: prev.len(),
        current_duplicate_signature_count: curr.len(),
        drop_count: drop,
        drop_ratio: round6(drop_ratio),
        thresholds: thresholds.clone(),
        removed_signature_count: removed.len(),
        removed_signature_examples: examples(removed, max_examples),
    };
    Ok(Some(Marker::new(
        MARKER_ID,
        &previous,
        &current,
        MarkerEvidence::DuplicateCleanup(evidence),
    )))
}

/// XEW-P001 instance ids across `findings`.
pub fn duplicate_signature_ids(findings: &[Finding]) -> Vec<String> {
    let ids = normalize_set(
        findings
            .iter()
            .filter(|f| f.pattern_id == DUPLICATE_PATTERN_ID)
            .flat_map(|f| f.instance_ids()),
    );
    ids.into_iter().collect()
}

/// [`detect_duplicate_cleanup_marker`] with the current signature ids taken
/// from detector findings.
pub fn detect_duplicate_cleanup_from_findings(
    current_accession: &str,
    findings: &[Finding],
    history: &[FilingSnapshot],
    thresholds: &DuplicateCleanupThresholds,
    max_examples: usize,
) -> Result<Option<Marker>, MarkerError> {
    let ids = duplicate_signature_ids(findings);
    detect_duplicate_cleanup_marker(current_accession, &ids, history, thresholds, max_examples)
}
