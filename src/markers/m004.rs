//! XEW-M004: context model rewrite.
//!
//! Two independent signals, either of which fires the marker:
//!
//! - the context count moves by a large absolute and relative amount
//! - the set of dimension/member combinations churns
//!
//! Each signal has its own baseline. When neither baseline holds there is
//! nothing to compare against.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    examples, normalize_set, ratio, round6, select_prior_snapshot, FilingSnapshot, Marker, MarkerError,
    MarkerEvidence,
};
use crate::types::Accession;

/// Marker id.
pub const MARKER_ID: &str = "XEW-M004";

/// XEW-M004 thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextModelRewriteThresholds {
    /// Minimum `|current - previous| / previous` context count.
    pub min_context_count_change_ratio: f64,
    /// Minimum absolute context count change.
    pub min_context_count_change: usize,
    /// Context count baseline.
    pub min_previous_context_count: usize,
    /// Minimum `(new + retired) / previous` dimension member sets.
    pub min_dim_member_churn_ratio: f64,
    /// Minimum new plus retired dimension member sets.
    pub min_dim_member_churn_count: usize,
    /// Dimension member set baseline.
    pub min_previous_dim_member_count: usize,
}

impl Default for ContextModelRewriteThresholds {
    fn default() -> Self {
        Self {
            min_context_count_change_ratio: 0.4,
            min_context_count_change: 25,
            min_previous_context_count: 50,
            min_dim_member_churn_ratio: 0.4,
            min_dim_member_churn_count: 10,
            min_previous_dim_member_count: 25,
        }
    }
}

/// XEW-M004 evidence.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextModelRewriteEvidence {
    pub previous_context_count: usize,
    pub current_context_count: usize,
    pub context_count_change: usize,
    pub context_count_change_ratio: f64,
    pub previous_dimension_member_set_count: usize,
    pub current_dimension_member_set_count: usize,
    pub dimension_member_churn_count: usize,
    pub dimension_member_churn_ratio: f64,
    pub new_dimension_member_set_count: usize,
    pub retired_dimension_member_set_count: usize,
    pub new_dimension_member_set_examples: Vec<String>,
    pub retired_dimension_member_set_examples: Vec<String>,
    pub context_change_triggered: bool,
    pub dimension_member_change_triggered: bool,
    pub thresholds: ContextModelRewriteThresholds,
}

/// Compare the context model against the most recent prior snapshot.
pub fn detect_context_model_rewrite_marker(
    current_accession: &str,
    current_context_count: usize,
    current_dimension_member_sets: &[String],
    history: &[FilingSnapshot],
    thresholds: &ContextModelRewriteThresholds,
    max_examples: usize,
) -> Result<Option<Marker>, MarkerError> {
    let current = Accession::parse(current_accession)?;
    let Some((prior, previous)) = select_prior_snapshot(history, &current) else {
        return Ok(None);
    };

    let prev_contexts = prior.context_count;
    let prev_sets = normalize_set(&prior.dimension_member_signatures);
    let curr_sets = normalize_set(current_dimension_member_sets);

    let context_baseline = prev_contexts >= thresholds.min_previous_context_count;
    let dimension_baseline = prev_sets.len() >= thresholds.min_previous_dim_member_count;
    if !context_baseline && !dimension_baseline {
        debug!(
            marker_id = MARKER_ID,
            previous_contexts = prev_contexts,
            previous_dimension_sets = prev_sets.len(),
            "baseline too small"
        );
        return Ok(None);
    }

    let context_change = current_context_count.abs_diff(prev_contexts);
    let context_ratio = ratio(context_change, prev_contexts);

    let new_sets: Vec<&String> = curr_sets.difference(&prev_sets).collect();
    let retired_sets: Vec<&String> = prev_sets.difference(&curr_sets).collect();
    let churn = new_sets.len() + retired_sets.len();
    let churn_ratio = ratio(churn, prev_sets.len());

    let context_triggered = context_baseline
        && context_change >= thresholds.min_context_count_change
        && context_ratio >= thresholds.min_context_count_change_ratio;
    let dimension_triggered = dimension_baseline
        && churn >= thresholds.min_dim_member_churn_count
        && churn_ratio >= thresholds.min_dim_member_churn_ratio;
    if !context_triggered && !dimension_triggered {
        return Ok(None);
    }

    let evidence = ContextModelRewriteEvidence {
        previous_context_count: prev_contexts,
        current_context_count,
        context_count_change: context_change,
        context_count_change_ratio: round6(context_ratio),
        previous_dimension_member_set_count: prev_sets.len(),
        current_dimension_member_set_count: curr_sets.len(),
        dimension_member_churn_count: churn,
        dimension_member_churn_ratio: round6(churn_ratio),
        new_dimension_member_set_count: new_sets.len(),
        retired_dimension_member_set_count: retired_sets.len(),
        new_dimension_member_set_examples: examples(new_sets, max_examples),
        retired_dimension_member_set_examples: examples(retired_sets, max_examples),
        context_change_triggered: context_triggered,
        dimension_member_change_triggered: dimension_triggered,
        thresholds: thresholds.clone(),
    };
    Ok(Some(Marker::new(
        MARKER_ID,
        &previous,
        &current,
        MarkerEvidence::ContextModelRewrite(evidence),
    )))
}
