//! XEW-M002: extension refactor.
//!
//! Churn in the set of extension concept QNames. A company that renames or
//! rebuilds its extension elements in bulk loses comparability with its own
//! history even when every individual filing validates.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    examples, normalize_set, ratio, round6, select_prior_snapshot, FilingSnapshot, Marker, MarkerError,
    MarkerEvidence,
};
use crate::types::Accession;

/// Marker id.
pub const MARKER_ID: &str = "XEW-M002";

/// XEW-M002 thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionRefactorThresholds {
    /// Minimum `(new + retired) / previous`.
    pub min_churn_ratio: f64,
    /// Minimum newly introduced extension concepts.
    pub min_new_count: usize,
    /// Minimum retired extension concepts.
    pub min_retired_count: usize,
    /// Minimum extension concepts in the prior filing.
    pub min_previous_count: usize,
}

impl Default for ExtensionRefactorThresholds {
    fn default() -> Self {
        Self {
            min_churn_ratio: 0.25,
            min_new_count: 5,
            min_retired_count: 5,
            min_previous_count: 10,
        }
    }
}

/// XEW-M002 evidence.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionRefactorEvidence {
    pub previous_extension_count: usize,
    pub current_extension_count: usize,
    pub new_extension_count: usize,
    pub retired_extension_count: usize,
    pub churn_count: usize,
    pub churn_ratio: f64,
    pub thresholds: ExtensionRefactorThresholds,
    pub new_extension_examples: Vec<String>,
    pub retired_extension_examples: Vec<String>,
}

/// Compare current extension QNames against the most recent prior snapshot.
pub fn detect_extension_refactor_marker(
    current_accession: &str,
    current_extension_qnames: &[String],
    history: &[FilingSnapshot],
    thresholds: &ExtensionRefactorThresholds,
    max_examples: usize,
) -> Result<Option<Marker>, MarkerError> {
    let current = Accession::parse(current_accession)?;
    let Some((prior, previous)) = select_prior_snapshot(history, &current) else {
        return Ok(None);
    };

    let prev = normalize_set(&prior.extension_qnames);
    let curr = normalize_set(current_extension_qnames);
    if prev.len() < thresholds.min_previous_count {
        debug!(marker_id = MARKER_ID, previous = prev.len(), "baseline too small");
        return Ok(None);
    }

    let new: Vec<&String> = curr.difference(&prev).collect();
    let retired: Vec<&String> = prev.difference(&curr).collect();
    let churn = new.len() + retired.len();
    if churn == 0 {
        return Ok(None);
    }
    let churn_ratio = ratio(churn, prev.len());
    if churn_ratio < thresholds.min_churn_ratio
        || new.len() < thresholds.min_new_count
        || retired.len() < thresholds.min_retired_count
    {
        return Ok(None);
    }

    let evidence = ExtensionRefactorEvidence {
        previous_extension_count: prev.len(),
        current_extension_count: curr.len(),
        new_extension_count: new.len(),
        retired_extension_count: retired.len(),
        churn_count: churn,
        churn_ratio: round6(churn_ratio),
        thresholds: thresholds.clone(),
        new_extension_examples: examples(new, max_examples),
        retired_extension_examples: examples(retired, max_examples),
    };
    Ok(Some(Marker::new(
        MARKER_ID,
        &previous,
        &current,
        MarkerEvidence::ExtensionRefactor(evidence),
    )))
}
