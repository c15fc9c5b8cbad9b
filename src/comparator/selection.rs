//! Comparator and history window selection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

use super::policy::{comparator_policy, forms_compatible};
use super::SelectionError;
use crate::config::DEFAULT_HISTORY_WINDOW;
use crate::types::Accession;

/// A prior filing offered for comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Accession number.
    pub accession: String,
    /// Form type, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    /// Filing date, `YYYY-MM-DD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filed_date: Option<String>,
    /// EDGAR URL of the primary document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_document_url: Option<String>,
    /// Local copy of the primary document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_artifact_path: Option<String>,
}

impl HistoryEntry {
    /// Entry with only an accession.
    pub fn new(accession: impl Into<String>) -> Self {
        Self {
            accession: accession.into(),
            form: None,
            filed_date: None,
            primary_document_url: None,
            primary_artifact_path: None,
        }
    }

    /// Set the form type.
    pub fn with_form(mut self, form: impl Into<String>) -> Self {
        self.form = Some(form.into());
        self
    }

    /// Set the primary document URL.
    pub fn with_primary_document_url(mut self, url: impl Into<String>) -> Self {
        self.primary_document_url = Some(url.into());
        self
    }

    /// Set the local primary document path.
    pub fn with_primary_artifact_path(mut self, path: impl Into<String>) -> Self {
        self.primary_artifact_path = Some(path.into());
        self
    }

    fn sort_key(&self) -> (&str, &str, &str) {
        (
            self.accession.as_str(),
            self.primary_document_url.as_deref().unwrap_or(""),
            self.primary_artifact_path.as_deref().unwrap_or(""),
        )
    }

    fn normalized(&self, field: String) -> Result<Self, SelectionError> {
        let accession = Accession::parse(&self.accession).map_err(|source| SelectionError::Validation { field, source })?;
        Ok(Self {
            accession: accession.into(),
            ..self.clone()
        })
    }
}

/// Why the comparator was (or was not) chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// Caller supplied the comparator.
    ExplicitUserProvided,
    /// Picked from the history entries.
    AutoSelectedFromHistory,
    /// Required, but no history entry qualified.
    NoSuitableComparator,
    /// Form does not need a comparator.
    NotRequiredByPolicy,
    /// Required, but no history was supplied.
    NoHistoryProvided,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ExplicitUserProvided => "explicit_user_provided",
            Self::AutoSelectedFromHistory => "auto_selected_from_history",
            Self::NoSuitableComparator => "no_suitable_comparator",
            Self::NotRequiredByPolicy => "not_required_by_policy",
            Self::NoHistoryProvided => "no_history_provided",
        };
        f.write_str(s)
    }
}

/// Selection metadata recorded in the findings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionMetadata {
    /// Why the comparator was chosen.
    pub selection_reason: SelectionReason,
    /// History entries offered.
    pub comparator_count_available: usize,
    /// Entries in the returned window.
    pub history_window_size: usize,
    /// Whether the form's policy requires a comparator.
    pub policy_required: bool,
    /// Base form of the current filing.
    pub base_form: String,
    /// Chosen comparator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_comparator_accession: Option<String>,
}

/// Output of [`select_comparator_and_history`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    /// Chosen comparator, if any.
    pub comparator: Option<HistoryEntry>,
    /// Window for marker analysis, oldest first.
    pub history_window: Vec<HistoryEntry>,
    /// Metadata for the findings document.
    pub metadata: SelectionMetadata,
}

/// Choose a comparator and bounded history window for the current filing.
///
/// Every history accession is validated; one malformed entry fails the whole
/// selection. Entries with a known, incompatible form are dropped, as are
/// entries not strictly prior to `current_accession`.
pub fn select_comparator_and_history(
    form: &str,
    explicit: Option<&HistoryEntry>,
    history: &[HistoryEntry],
    current_accession: &str,
    max_window: usize,
) -> Result<SelectionResult, SelectionError> {
    let policy = comparator_policy(form)?;
    let current = Accession::parse(current_accession).map_err(|source| SelectionError::Validation {
        field: "current_accession".to_string(),
        source,
    })?;

    let mut prior = Vec::with_capacity(history.len());
    for (index, entry) in history.iter().enumerate() {
        let entry = entry.normalized(format!("history[{index}].accession"))?;
        if let Some(entry_form) = entry.form.as_deref() {
            match forms_compatible(form, entry_form) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(accession = %entry.accession, form = entry_form, "dropping incompatible history form");
                    continue;
                }
                Err(e) => {
                    warn!(accession = %entry.accession, error = %e, "dropping history entry with unsupported form");
                    continue;
                }
            }
        }
        if entry.accession.as_str() < current.as_str() {
            prior.push(entry);
        }
    }

    let (comparator, reason) = match explicit {
        Some(entry) => (
            Some(entry.normalized("comparator.accession".to_string())?),
            SelectionReason::ExplicitUserProvided,
        ),
        None if policy.comparator_required && !history.is_empty() => {
            let best = prior.iter().max_by(|a, b| a.sort_key().cmp(&b.sort_key())).cloned();
            let reason = if best.is_some() {
                SelectionReason::AutoSelectedFromHistory
            } else {
                SelectionReason::NoSuitableComparator
            };
            (best, reason)
        }
        None if policy.comparator_required => (None, SelectionReason::NoHistoryProvided),
        None => (None, SelectionReason::NotRequiredByPolicy),
    };

    let history_window = build_window(prior, comparator.as_ref(), max_window);
    let metadata = SelectionMetadata {
        selection_reason: reason,
        comparator_count_available: history.len(),
        history_window_size: history_window.len(),
        policy_required: policy.comparator_required,
        base_form: policy.base_form,
        selected_comparator_accession: comparator.as_ref().map(|c| c.accession.clone()),
    };
    info!(
        current = %current,
        reason = %metadata.selection_reason,
        comparator = ?metadata.selected_comparator_accession,
        window = metadata.history_window_size,
        "comparator selection complete"
    );
    Ok(SelectionResult {
        comparator,
        history_window,
        metadata,
    })
}

/// [`select_comparator_and_history`] with the default window size.
pub fn select_with_default_window(
    form: &str,
    explicit: Option<&HistoryEntry>,
    history: &[HistoryEntry],
    current_accession: &str,
) -> Result<SelectionResult, SelectionError> {
    select_comparator_and_history(form, explicit, history, current_accession, DEFAULT_HISTORY_WINDOW)
}

fn build_window(prior: Vec<HistoryEntry>, comparator: Option<&HistoryEntry>, max_window: usize) -> Vec<HistoryEntry> {
    let unique: BTreeMap<(String, String, String), HistoryEntry> = prior
        .into_iter()
        .map(|e| {
            let (a, u, p) = e.sort_key();
            ((a.to_string(), u.to_string(), p.to_string()), e)
        })
        .collect();
    let mut window: Vec<HistoryEntry> = unique.into_values().rev().take(max_window).collect();

    if let Some(comparator) = comparator {
        if max_window > 0 && !window.contains(comparator) {
            window.truncate(max_window - 1);
            window.insert(0, comparator.clone());
        }
    }
    window.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    window
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURRENT: &str = "0000123456-24-000010";

    fn entry(seq: u32) -> HistoryEntry {
        HistoryEntry::new(format!("0000123456-{:02}-{:06}", 15 + seq, seq)).with_form("10-K")
    }

    fn accessions(entries: &[HistoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.accession.as_str()).collect()
    }

    #[test]
    fn test_auto_selects_latest_prior() {
        let history: Vec<HistoryEntry> = (1..=8).map(entry).collect();
        let result = select_with_default_window("10-K", None, &history, CURRENT).unwrap();
        assert_eq!(result.metadata.selection_reason, SelectionReason::AutoSelectedFromHistory);
        assert_eq!(result.metadata.selected_comparator_accession.as_deref(), Some("0000123456-23-000008"));
        assert_eq!(result.history_window.len(), 5);
        assert_eq!(
            accessions(&result.history_window),
            vec![
                "0000123456-19-000004",
                "0000123456-20-000005",
                "0000123456-21-000006",
                "0000123456-22-000007",
                "0000123456-23-000008"
            ]
        );
        assert_eq!(result.metadata.comparator_count_available, 8);
    }

    #[test]
    fn test_future_and_incompatible_entries_dropped() {
        let history = vec![
            entry(8),
            HistoryEntry::new("0000123456-23-000009").with_form("10-Q"),
            HistoryEntry::new("0000123456-25-000001").with_form("10-K"),
            HistoryEntry::new("0000123456-23-000010").with_form("S-1"),
        ];
        let result = select_with_default_window("10-K/A", None, &history, CURRENT).unwrap();
        assert_eq!(accessions(&result.history_window), vec!["0000123456-23-000008"]);
    }

    #[test]
    fn test_explicit_comparator_inserted_into_full_window() {
        let history: Vec<HistoryEntry> = (1..=8).map(entry).collect();
        let explicit = entry(1);
        let result = select_comparator_and_history("10-K", Some(&explicit), &history, CURRENT, 3).unwrap();
        assert_eq!(result.metadata.selection_reason, SelectionReason::ExplicitUserProvided);
        assert_eq!(
            accessions(&result.history_window),
            vec!["0000123456-16-000001", "0000123456-22-000007", "0000123456-23-000008"]
        );
    }

    #[test]
    fn test_event_forms_not_required() {
        let history: Vec<HistoryEntry> = (1..=2).map(|i| entry(i).with_form("8-K")).collect();
        let result = select_with_default_window("8-K", None, &history, CURRENT).unwrap();
        assert_eq!(result.metadata.selection_reason, SelectionReason::NotRequiredByPolicy);
        assert!(result.comparator.is_none());
        assert_eq!(result.history_window.len(), 2);
        assert!(!result.metadata.policy_required);
    }

    #[test]
    fn test_required_without_history() {
        let result = select_with_default_window("10-Q", None, &[], CURRENT).unwrap();
        assert_eq!(result.metadata.selection_reason, SelectionReason::NoHistoryProvided);
        assert!(result.history_window.is_empty());
    }

    #[test]
    fn test_required_with_only_later_history() {
        let history = vec![HistoryEntry::new("0000123456-25-000001")];
        let result = select_with_default_window("10-K", None, &history, CURRENT).unwrap();
        assert_eq!(result.metadata.selection_reason, SelectionReason::NoSuitableComparator);
    }

    #[test]
    fn test_malformed_history_accession_fails() {
        let history = vec![entry(1), HistoryEntry::new("2024-000001")];
        let err = select_with_default_window("10-K", None, &history, CURRENT).unwrap_err();
        assert!(matches!(err, SelectionError::Validation { ref field, .. } if field == "history[1].accession"));
    }

    #[test]
    fn test_tie_break_on_secondary_key() {
        let history = vec![
            HistoryEntry::new("0000123456-23-000008").with_primary_document_url("https://a"),
            HistoryEntry::new("0000123456-23-000008").with_primary_document_url("https://b"),
            HistoryEntry::new(" 0000123456-23-000008 ").with_primary_document_url("https://b"),
        ];
        let result = select_with_default_window("10-K", None, &history, CURRENT).unwrap();
        let comparator = result.comparator.unwrap();
        assert_eq!(comparator.primary_document_url.as_deref(), Some("https://b"));
        assert_eq!(result.history_window.len(), 2);
    }

    #[test]
    fn test_metadata_serializes_snake_case() {
        let result = select_with_default_window("10-K", None, &[entry(1)], CURRENT).unwrap();
        let json = serde_json::to_value(&result.metadata).unwrap();
        assert_eq!(json["selection_reason"], "auto_selected_from_history");
        assert_eq!(json["base_form"], "10-K");
    }
}
