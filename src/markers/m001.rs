//! XEW-M001: taxonomy refresh.
//!
//! Fires when the set of `schemaRef` hrefs changes materially between the
//! prior and the current filing, which is how a taxonomy version migration
//! or a rebuilt extension schema shows up in the instance.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    examples, normalize_set, ratio, round6, select_prior_snapshot, FilingSnapshot, Marker, MarkerError,
    MarkerEvidence,
};
use crate::types::Accession;

/// Marker id.
pub const MARKER_ID: &str = "XEW-M001";

/// XEW-M001 thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyRefreshThresholds {
    /// Minimum added plus removed refs.
    pub min_change_count: usize,
    /// Minimum change relative to the prior ref count.
    pub min_change_ratio: f64,
    /// Minimum prior ref count for a meaningful baseline.
    pub min_previous_count: usize,
}

impl Default for TaxonomyRefreshThresholds {
    fn default() -> Self {
        Self {
            min_change_count: 1,
            min_change_ratio: 0.2,
            min_previous_count: 1,
        }
    }
}

/// XEW-M001 evidence.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyRefreshEvidence {
    pub previous_schema_ref_count: usize,
    pub current_schema_ref_count: usize,
    pub schema_ref_change_count: usize,
    pub schema_ref_change_ratio: f64,
    pub added_schema_refs: Vec<String>,
    pub removed_schema_refs: Vec<String>,
    pub previous_schema_refs: Vec<String>,
    pub current_schema_refs: Vec<String>,
    pub thresholds: TaxonomyRefreshThresholds,
}

fn trimmed(refs: &[String]) -> impl Iterator<Item = &str> {
    refs.iter().map(|r| r.trim()).filter(|r| !r.is_empty())
}

/// Compare the current schema refs against the most recent prior snapshot.
pub fn detect_taxonomy_refresh_marker(
    current_accession: &str,
    current_schema_refs: &[String],
    history: &[FilingSnapshot],
    thresholds: &TaxonomyRefreshThresholds,
    max_examples: usize,
) -> Result<Option<Marker>, MarkerError> {
    let current = Accession::parse(current_accession)?;
    let Some((prior, previous)) = select_prior_snapshot(history, &current) else {
        return Ok(None);
    };

    let prev_refs = normalize_set(trimmed(&prior.schema_refs));
    let curr_refs = normalize_set(trimmed(current_schema_refs));
    if prev_refs.len() < thresholds.min_previous_count {
        debug!(marker_id = MARKER_ID, previous = prev_refs.len(), "baseline too small");
        return Ok(None);
    }

    let added: Vec<&String> = curr_refs.difference(&prev_refs).collect();
    let removed: Vec<&String> = prev_refs.difference(&curr_refs).collect();
    let change = added.len() + removed.len();
    if change == 0 {
        return Ok(None);
    }
    let change_ratio = ratio(change, prev_refs.len());
    if change < thresholds.min_change_count || change_ratio < thresholds.min_change_ratio {
        return Ok(None);
    }

    let evidence = TaxonomyRefreshEvidence {
        previous_schema_ref_count: prev_refs.len(),
        current_schema_ref_count: curr_refs.len(),
        schema_ref_change_count: change,
        schema_ref_change_ratio: round6(change_ratio),
        added_schema_refs: examples(added, max_examples),
        removed_schema_refs: examples(removed, max_examples),
        previous_schema_refs: prev_refs.iter().cloned().collect(),
        current_schema_refs: curr_refs.iter().cloned().collect(),
        thresholds: thresholds.clone(),
    };
    Ok(Some(Marker::new(
        MARKER_ID,
        &previous,
        &current,
        MarkerEvidence::TaxonomyRefresh(evidence),
    )))
}
