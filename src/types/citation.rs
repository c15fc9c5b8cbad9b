//! Rule-basis citations backing a finding.
//!
//! A citation pins a regulatory or technical source (EFM section, XBRL spec
//! clause, taxonomy guidance) to the exact bytes that were read, via a
//! retrieval timestamp and a SHA-256 of the source document.
//!
//! ## Validity
//!
//! | Field | Requirement |
//! |-------|-------------|
//! | `source` | non-empty |
//! | `retrieved_at` | ISO-8601 UTC, `YYYY-MM-DDTHH:MM[:SS[.f]]Z` |
//! | `sha256` | 64 hex characters |
//! | `url` / `title` | at least one non-empty |
//!
//! Validation reports the first failed requirement as a [`CitationError`]. It
//! never panics; the gate only counts how many citations pass.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::canonical_content::is_sha256_hex;
use crate::types::identifiers::static_regex;

/// One citation in a finding's rule basis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBasisCitation {
    /// Source family, e.g. `EFM` or `XBRL 2.1`.
    #[serde(default)]
    pub source: String,
    /// Section or clause reference.
    #[serde(default)]
    pub citation: String,
    /// Where the source was retrieved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// UTC retrieval timestamp.
    #[serde(default)]
    pub retrieved_at: String,
    /// SHA-256 of the retrieved source.
    #[serde(default)]
    pub sha256: String,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Reason a citation fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CitationError {
    /// `source` is blank.
    #[error("citation source is empty")]
    MissingSource,
    /// `retrieved_at` is blank.
    #[error("citation retrieved_at is empty")]
    MissingRetrievedAt,
    /// `retrieved_at` is not an ISO-8601 UTC timestamp.
    #[error("citation retrieved_at {0:?} is not an ISO-8601 UTC timestamp")]
    InvalidRetrievedAt(String),
    /// `sha256` is blank.
    #[error("citation sha256 is empty")]
    MissingSha256,
    /// `sha256` is not 64 hex characters.
    #[error("citation sha256 {0:?} is not 64 hex characters")]
    InvalidSha256(String),
    /// Neither `url` nor `title` is present.
    #[error("citation needs a url or a title")]
    MissingLocator,
}

fn is_iso_utc(value: &str) -> bool {
    static ISO_UTC: OnceLock<Regex> = OnceLock::new();
    static_regex(
        &ISO_UTC,
        r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}(:\d{2}(\.\d+)?)?Z$",
    )
    .is_match(value)
}

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

impl RuleBasisCitation {
    /// Create a citation with the mandatory fields.
    pub fn new(
        source: impl Into<String>,
        citation: impl Into<String>,
        retrieved_at: impl Into<String>,
        sha256: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            citation: citation.into(),
            url: None,
            title: None,
            retrieved_at: retrieved_at.into(),
            sha256: sha256.into(),
            notes: None,
        }
    }

    /// Set the source URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attach notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Check the citation against the validity table.
    pub fn validate(&self) -> Result<(), CitationError> {
        if self.source.trim().is_empty() {
            return Err(CitationError::MissingSource);
        }
        let retrieved_at = self.retrieved_at.trim();
        if retrieved_at.is_empty() {
            return Err(CitationError::MissingRetrievedAt);
        }
        if !is_iso_utc(retrieved_at) {
            return Err(CitationError::InvalidRetrievedAt(retrieved_at.to_string()));
        }
        let sha = self.sha256.trim();
        if sha.is_empty() {
            return Err(CitationError::MissingSha256);
        }
        if !is_sha256_hex(sha) {
            return Err(CitationError::InvalidSha256(sha.to_string()));
        }
        if !non_blank(&self.url) && !non_blank(&self.title) {
            return Err(CitationError::MissingLocator);
        }
        Ok(())
    }

    /// Shorthand for `validate().is_ok()`.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RuleBasisCitation {
        RuleBasisCitation::new("EFM", "6.5.12", "2026-01-31T15:38:00Z", "a".repeat(64))
            .with_url("https://www.sec.gov/efm")
    }

    #[test]
    fn test_valid_citation() {
        assert_eq!(valid().validate(), Ok(()));
        let titled = RuleBasisCitation::new("XBRL 2.1", "4.6.6", "2026-01-31T15:38Z", "B".repeat(64))
            .with_title("XBRL 2.1 Specification");
        assert!(titled.is_valid());
    }

    #[test]
    fn test_each_requirement() {
        let mut c = valid();
        c.source = " ".into();
        assert_eq!(c.validate(), Err(CitationError::MissingSource));

        let mut c = valid();
        c.retrieved_at = "2026-01-31 15:38:00".into();
        assert!(matches!(c.validate(), Err(CitationError::InvalidRetrievedAt(_))));

        let mut c = valid();
        c.retrieved_at = "2026-01-31T15:38:00+00:00".into();
        assert!(matches!(c.validate(), Err(CitationError::InvalidRetrievedAt(_))));

        let mut c = valid();
        c.sha256 = String::new();
        assert_eq!(c.validate(), Err(CitationError::MissingSha256));

        let mut c = valid();
        c.sha256 = "abc".into();
        assert!(matches!(c.validate(), Err(CitationError::InvalidSha256(_))));

        let mut c = valid();
        c.url = Some("".into());
        assert_eq!(c.validate(), Err(CitationError::MissingLocator));
    }

    #[test]
    fn test_missing_source_deserializes_then_fails_validation() {
        let c: RuleBasisCitation =
            serde_json::from_str(r#"{"citation":"6.5.12","retrieved_at":"x","sha256":"y"}"#).unwrap();
        assert_eq!(c.validate(), Err(CitationError::MissingSource));
    }

    #[test]
    fn test_serde_omits_absent_optionals() {
        let json = serde_json::to_value(valid()).unwrap();
        assert!(json.get("title").is_none());
        assert!(json.get("notes").is_none());
        let back: RuleBasisCitation = serde_json::from_value(json).unwrap();
        assert_eq!(back, valid());
    }
}
