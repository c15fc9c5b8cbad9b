//! Cross-filing markers (XEW-M001..M005).
//!
//! A marker compares the current filing against the most recent prior
//! snapshot and fires when a structural change crosses its thresholds.
//! Markers are informational context for findings: they never change a
//! finding and are never alert-eligible.
//!
//! ## Shape
//!
//! ```text
//! prior    = max { s in history | valid(s.accession), s.accession < current }
//! baseline = |reference population of prior| >= min_previous_*
//! fire     = count >= min_* and ratio >= min_*_ratio
//! ```
//!
//! No prior snapshot, an insufficient baseline or an unmet threshold is
//! `Ok(None)`. Only an invalid *current* accession is an error.

pub mod engine;
pub mod m001;
pub mod m002;
pub mod m003;
pub mod m004;
pub mod m005;

pub use engine::{FilingSnapshot, MarkerEngine};
pub use m001::{detect_taxonomy_refresh_marker, TaxonomyRefreshEvidence, TaxonomyRefreshThresholds};
pub use m002::{detect_extension_refactor_marker, ExtensionRefactorEvidence, ExtensionRefactorThresholds};
pub use m003::{detect_anchoring_retrofit_marker, AnchoringRetrofitEvidence, AnchoringRetrofitThresholds};
pub use m004::{detect_context_model_rewrite_marker, ContextModelRewriteEvidence, ContextModelRewriteThresholds};
pub use m005::{
    detect_duplicate_cleanup_from_findings, detect_duplicate_cleanup_marker, DuplicateCleanupEvidence,
    DuplicateCleanupThresholds,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{Accession, ValidationError};

/// Marker failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkerError {
    /// The current filing's accession is malformed.
    #[error("Marker input rejected: {0}")]
    Validation(#[from] ValidationError),
}

/// Pair of filings a marker spans.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerBoundary {
    /// Prior filing.
    pub from_accession: String,
    /// Current filing.
    pub to_accession: String,
}

/// Marker-specific evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkerEvidence {
    /// XEW-M004.
    ContextModelRewrite(ContextModelRewriteEvidence),
    /// XEW-M003.
    AnchoringRetrofit(AnchoringRetrofitEvidence),
    /// XEW-M002.
    ExtensionRefactor(ExtensionRefactorEvidence),
    /// XEW-M001.
    TaxonomyRefresh(TaxonomyRefreshEvidence),
    /// XEW-M005.
    DuplicateCleanup(DuplicateCleanupEvidence),
}

/// A fired marker as written to the findings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// `XEW-M00N`.
    pub marker_id: String,
    /// Filings compared.
    pub boundary: MarkerBoundary,
    /// Counts, ratios, examples and the thresholds applied.
    pub evidence: MarkerEvidence,
}

impl Marker {
    pub(crate) fn new(marker_id: &str, from: &Accession, to: &Accession, evidence: MarkerEvidence) -> Self {
        Self {
            marker_id: marker_id.to_string(),
            boundary: MarkerBoundary {
                from_accession: from.to_string(),
                to_accession: to.to_string(),
            },
            evidence,
        }
    }
}

/// Thresholds for every marker, as carried by the engine config.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerThresholds {
    /// XEW-M001.
    pub taxonomy_refresh: TaxonomyRefreshThresholds,
    /// XEW-M002.
    pub extension_refactor: ExtensionRefactorThresholds,
    /// XEW-M003.
    pub anchoring_retrofit: AnchoringRetrofitThresholds,
    /// XEW-M004.
    pub context_model_rewrite: ContextModelRewriteThresholds,
    /// XEW-M005.
    pub duplicate_cleanup: DuplicateCleanupThresholds,
}

/// Most recent snapshot strictly before `current`.
///
/// Snapshots with malformed accessions are skipped, not rejected.
pub fn select_prior_snapshot<'a>(
    history: &'a [FilingSnapshot],
    current: &Accession,
) -> Option<(&'a FilingSnapshot, Accession)> {
    history
        .iter()
        .filter_map(|s| Accession::parse(&s.accession).ok().map(|a| (s, a)))
        .filter(|(_, a)| a < current)
        .max_by(|(_, a), (_, b)| a.cmp(b))
}

/// Deduplicate and sort.
pub(crate) fn normalize_set<I, S>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values.into_iter().map(|v| v.as_ref().to_string()).collect()
}

pub(crate) fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

pub(crate) fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

pub(crate) fn examples<'a>(values: impl IntoIterator<Item = &'a String>, max_examples: usize) -> Vec<String> {
    values.into_iter().take(max_examples).cloned().collect()
}

/// Order markers by `(marker_id, from_accession, to_accession)`.
pub fn sort_markers(markers: &mut [Marker]) {
    markers.sort_by(|a, b| (&a.marker_id, &a.boundary).cmp(&(&b.marker_id, &b.boundary)));
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::FilingSnapshot;

    pub const PRIOR: &str = "0000123456-23-000010";
    pub const CURRENT: &str = "0000123456-24-000001";

    /// Named string set for building marker inputs.
    pub fn names(prefix: &str, range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| format!("{prefix}{i:03}")).collect()
    }

    pub fn bare(accession: &str) -> FilingSnapshot {
        FilingSnapshot::new(accession)
    }
}
