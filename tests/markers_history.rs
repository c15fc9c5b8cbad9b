//! Marker thresholds and comparator history selection through the public API.

use proptest::prelude::*;

use xew_evidence_kernel::comparator::{select_comparator_and_history, HistoryEntry, SelectionReason};
use xew_evidence_kernel::markers::{
    detect_duplicate_cleanup_marker, detect_extension_refactor_marker, DuplicateCleanupThresholds,
    ExtensionRefactorThresholds, MarkerEvidence,
};
use xew_evidence_kernel::{FilingSnapshot, MarkerEngine, SelectionError};

const PRIOR: &str = "0000123456-23-000010";
const CURRENT: &str = "0000123456-24-000001";

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn ids(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}{i:04}")).collect()
}

fn prior_with_duplicates(n: usize) -> Vec<FilingSnapshot> {
    vec![FilingSnapshot {
        duplicate_signature_ids: ids("dup", n),
        ..FilingSnapshot::new(PRIOR)
    }]
}

fn entry(accession: &str, form: &str) -> HistoryEntry {
    HistoryEntry::new(accession).with_form(form)
}

// ─────────────────────────────────────────────────────────────────────────────
// Markers
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_duplicate_cleanup_fifty_to_twenty() {
    let current = ids("dup", 20);
    let marker = detect_duplicate_cleanup_marker(
        CURRENT,
        &current,
        &prior_with_duplicates(50),
        &DuplicateCleanupThresholds::default(),
        5,
    )
    .unwrap()
    .expect("drop of 30 fires");

    assert_eq!(marker.marker_id, "XEW-M005");
    assert_eq!(marker.boundary.from_accession, PRIOR);
    assert_eq!(marker.boundary.to_accession, CURRENT);
    let MarkerEvidence::DuplicateCleanup(evidence) = marker.evidence else {
        panic!("wrong evidence variant");
    };
    assert_eq!(evidence.drop_count, 30);
    assert_eq!(evidence.drop_ratio, 0.6);
    assert_eq!(evidence.removed_signature_count, 30);
    assert_eq!(evidence.removed_signature_examples.len(), 5);
}

#[test]
fn test_invalid_current_accession_is_an_error() {
    let result = detect_duplicate_cleanup_marker(
        "not-an-accession",
        &[],
        &prior_with_duplicates(50),
        &DuplicateCleanupThresholds::default(),
        5,
    );
    assert!(result.is_err());
}

#[test]
fn test_history_without_prior_yields_nothing() {
    let later = vec![FilingSnapshot {
        duplicate_signature_ids: ids("dup", 50),
        ..FilingSnapshot::new("0000123456-25-000001")
    }];
    let marker =
        detect_duplicate_cleanup_marker(CURRENT, &[], &later, &DuplicateCleanupThresholds::default(), 5).unwrap();
    assert!(marker.is_none());
}

#[test]
fn test_engine_orders_markers_by_id() {
    let history = vec![FilingSnapshot {
        schema_refs: vec!["https://xbrl.fasb.org/us-gaap/2023/elts/us-gaap-2023.xsd".into()],
        extension_qnames: ids("{http://acme.com/2023}Old", 20),
        ..FilingSnapshot::new(PRIOR)
    }];
    let current = FilingSnapshot {
        schema_refs: vec!["https://xbrl.fasb.org/us-gaap/2024/elts/us-gaap-2024.xsd".into()],
        extension_qnames: ids("{http://acme.com/2024}New", 20),
        ..FilingSnapshot::new(CURRENT)
    };
    let markers = MarkerEngine::default().compute(&current, &history, &[]).unwrap();
    let ids: Vec<&str> = markers.iter().map(|m| m.marker_id.as_str()).collect();
    assert_eq!(ids, vec!["XEW-M001", "XEW-M002"]);
}

proptest! {
    #[test]
    fn prop_duplicate_cleanup_threshold_boundary(previous in 0usize..60, current in 0usize..60) {
        let t = DuplicateCleanupThresholds::default();
        let current_ids = ids("dup", current);
        let fired = detect_duplicate_cleanup_marker(CURRENT, &current_ids, &prior_with_duplicates(previous), &t, 10)
            .unwrap()
            .is_some();
        let drop = previous.saturating_sub(current);
        let expected = previous >= t.min_previous_count
            && drop >= t.min_drop_count
            && drop as f64 / previous as f64 >= t.min_drop_ratio;
        prop_assert_eq!(fired, expected);
    }

    #[test]
    fn prop_extension_refactor_requires_both_directions(new in 0usize..12, retired in 0usize..12) {
        let t = ExtensionRefactorThresholds::default();
        let previous: Vec<String> = ids("keep", 20).into_iter().chain(ids("old", retired)).collect();
        let current: Vec<String> = ids("keep", 20).into_iter().chain(ids("new", new)).collect();
        let history = vec![FilingSnapshot { extension_qnames: previous, ..FilingSnapshot::new(PRIOR) }];
        let fired = detect_extension_refactor_marker(CURRENT, &current, &history, &t, 10).unwrap().is_some();
        if new < t.min_new_count || retired < t.min_retired_count {
            prop_assert!(!fired);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Comparator Selection
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_periodic_form_picks_latest_prior() {
    let history = vec![
        entry("0000123456-22-000010", "10-K"),
        entry("0000123456-23-000010", "10-K/A"),
        entry("0000123456-23-000020", "10-Q"),
    ];
    let result = select_comparator_and_history("10-K", None, &history, CURRENT, 5).unwrap();
    assert_eq!(result.metadata.selection_reason, SelectionReason::AutoSelectedFromHistory);
    assert_eq!(result.comparator.unwrap().accession, "0000123456-23-000010");
    let window: Vec<&str> = result.history_window.iter().map(|e| e.accession.as_str()).collect();
    assert_eq!(window, vec!["0000123456-22-000010", "0000123456-23-000010"]);
}

#[test]
fn test_event_form_needs_no_comparator() {
    let history = vec![entry("0000123456-23-000010", "8-K")];
    let result = select_comparator_and_history("8-K", None, &history, CURRENT, 5).unwrap();
    assert_eq!(result.metadata.selection_reason, SelectionReason::NotRequiredByPolicy);
    assert!(result.comparator.is_none());
    assert!(!result.metadata.policy_required);
}

#[test]
fn test_malformed_history_accession_is_fatal() {
    let history = vec![entry("bogus", "10-K")];
    assert!(matches!(
        select_comparator_and_history("10-K", None, &history, CURRENT, 5),
        Err(SelectionError::Validation { .. })
    ));
    assert!(matches!(
        select_comparator_and_history("S-1", None, &[], CURRENT, 5),
        Err(SelectionError::UnsupportedForm { .. })
    ));
}

proptest! {
    #[test]
    fn prop_window_is_bounded_prior_and_ascending(
        seqs in proptest::collection::vec(1u32..999_999, 0..15),
        max_window in 1usize..8,
    ) {
        let history: Vec<HistoryEntry> = seqs
            .iter()
            .map(|s| entry(&format!("0000123456-24-{s:06}"), "10-Q"))
            .collect();
        let current = "0000123456-24-500000";
        let result = select_comparator_and_history("10-Q", None, &history, current, max_window).unwrap();

        prop_assert!(result.history_window.len() <= max_window);
        prop_assert!(result.history_window.iter().all(|e| e.accession.as_str() < current));
        prop_assert!(result.history_window.windows(2).all(|w| w[0].accession < w[1].accession));
        if let Some(comparator) = &result.comparator {
            prop_assert_eq!(
                result.history_window.last().map(|e| e.accession.as_str()),
                Some(comparator.accession.as_str())
            );
        }
    }
}
