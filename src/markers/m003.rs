//! XEW-M003: anchoring retrofit.
//!
//! A jump in the share of extension concepts anchored to the standard
//! taxonomy. Anchored qnames outside the filing's own extension set are
//! ignored when computing coverage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use super::{
    examples, normalize_set, ratio, round6, select_prior_snapshot, FilingSnapshot, Marker, MarkerError,
    MarkerEvidence,
};
use crate::types::Accession;

/// Marker id.
pub const MARKER_ID: &str = "XEW-M003";

/// XEW-M003 thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchoringRetrofitThresholds {
    /// Minimum increase in anchored share of extensions.
    pub min_coverage_increase: f64,
    /// Minimum increase in anchored extension count.
    pub min_anchored_increase_count: i64,
    /// Minimum extension concepts in the prior filing.
    pub min_previous_extension_count: usize,
}

impl Default for AnchoringRetrofitThresholds {
    fn default() -> Self {
        Self {
            min_coverage_increase: 0.2,
            min_anchored_increase_count: 10,
            min_previous_extension_count: 25,
        }
    }
}

/// XEW-M003 evidence.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchoringRetrofitEvidence {
    pub previous_extension_count: usize,
    pub current_extension_count: usize,
    pub previous_anchored_count: usize,
    pub current_anchored_count: usize,
    pub previous_anchoring_coverage: f64,
    pub current_anchoring_coverage: f64,
    pub coverage_increase: f64,
    pub anchored_increase: i64,
    pub thresholds: AnchoringRetrofitThresholds,
    pub newly_anchored_count: usize,
    pub newly_anchored_examples: Vec<String>,
}

fn coverage_count(anchored: &BTreeSet<String>, extensions: &BTreeSet<String>) -> usize {
    anchored.intersection(extensions).count()
}

/// Compare anchoring coverage against the most recent prior snapshot.
pub fn detect_anchoring_retrofit_marker(
    current_accession: &str,
    current_extension_qnames: &[String],
    current_anchored_qnames: &[String],
    history: &[FilingSnapshot],
    thresholds: &AnchoringRetrofitThresholds,
    max_examples: usize,
) -> Result<Option<Marker>, MarkerError> {
    let current = Accession::parse(current_accession)?;
    let Some((prior, previous)) = select_prior_snapshot(history, &current) else {
        return Ok(None);
    };

    let prev_ext = normalize_set(&prior.extension_qnames);
    let prev_anchored = normalize_set(&prior.anchored_qnames);
    let curr_ext = normalize_set(current_extension_qnames);
    let curr_anchored = normalize_set(current_anchored_qnames);

    if prev_ext.len() < thresholds.min_previous_extension_count {
        debug!(marker_id = MARKER_ID, previous = prev_ext.len(), "baseline too small");
        return Ok(None);
    }

    let prev_count = coverage_count(&prev_anchored, &prev_ext);
    let curr_count = coverage_count(&curr_anchored, &curr_ext);
    let prev_ratio = ratio(prev_count, prev_ext.len());
    let curr_ratio = ratio(curr_count, curr_ext.len());
    let coverage_increase = curr_ratio - prev_ratio;
    let anchored_increase = curr_count as i64 - prev_count as i64;

    if coverage_increase < thresholds.min_coverage_increase
        || anchored_increase < thresholds.min_anchored_increase_count
    {
        return Ok(None);
    }

    let newly_anchored: Vec<&String> = curr_anchored.difference(&prev_anchored).collect();
    let evidence = AnchoringRetrofitEvidence {
        previous_extension_count: prev_ext.len(),
        current_extension_count: curr_ext.len(),
        previous_anchored_count: prev_count,
        current_anchored_count: curr_count,
        previous_anchoring_coverage: round6(prev_ratio),
        current_anchoring_coverage: round6(curr_ratio),
        coverage_increase: round6(coverage_increase),
        anchored_increase,
        thresholds: thresholds.clone(),
        newly_anchored_count: newly_anchored.len(),
        newly_anchored_examples: examples(newly_anchored, max_examples),
    };
    Ok(Some(Marker::new(
        MARKER_ID,
        &previous,
        &current,
        MarkerEvidence::AnchoringRetrofit(evidence),
    )))
}
