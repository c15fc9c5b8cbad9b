//! Comparator policy and history window selection.
//!
//! Markers need a window of prior filings to compare against. This module
//! decides which form types need a comparator at all, picks one
//! deterministically from the supplied history, and bounds the window.

pub mod policy;
pub mod selection;

pub use policy::{base_form, comparator_policy, forms_compatible, is_amendment, supported_forms, ComparatorPolicy};
pub use selection::{
    select_comparator_and_history, select_with_default_window, HistoryEntry, SelectionMetadata, SelectionReason,
    SelectionResult,
};

use crate::types::ValidationError;

/// Comparator selection failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// Form string is blank.
    #[error("Form must be a non-empty string")]
    EmptyForm,
    /// Form is outside the supported set.
    #[error("Unsupported form type: {form}")]
    UnsupportedForm {
        /// The rejected form.
        form: String,
    },
    /// An accession failed validation.
    #[error("Invalid {field}: {source}")]
    Validation {
        /// Which input carried the accession.
        field: String,
        /// Underlying error.
        #[source]
        source: ValidationError,
    },
}
