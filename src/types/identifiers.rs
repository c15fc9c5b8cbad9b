//! Validated identifiers: accession numbers, pattern ids, finding ids, CIKs and dates.
//!
//! Accession numbers order chronologically when compared as strings, so
//! [`Accession`] derives `Ord` and every "prior filing" decision in the crate
//! is a plain string comparison.

use chrono::{Datelike, NaiveDate, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Pattern identifiers the registry and marker engine accept.
pub const VALID_PATTERN_IDS: &[&str] = &[
    "P001", "P002", "P004", "P005", "P007", "M001", "M002", "M003", "M004", "M005",
];

/// Identifier validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Accession does not match `NNNNNNNNNN-NN-NNNNNN`.
    #[error("Invalid accession number: {value:?} (expected NNNNNNNNNN-NN-NNNNNN)")]
    InvalidAccession {
        /// The rejected input.
        value: String,
    },
    /// Pattern id outside the known set.
    #[error("Invalid pattern id: {value:?}")]
    InvalidPatternId {
        /// The rejected input.
        value: String,
    },
    /// CIK is empty, non-numeric, or longer than ten digits.
    #[error("Invalid CIK: {value:?} (expected 1-10 digits)")]
    InvalidCik {
        /// The rejected input.
        value: String,
    },
    /// Date is not `YYYY-MM-DD`.
    #[error("Invalid {field}: {value:?} (expected YYYY-MM-DD)")]
    InvalidDate {
        /// Field being parsed.
        field: &'static str,
        /// The rejected input.
        value: String,
    },
    /// Filed date outside the plausible EDGAR range.
    #[error("Filed date {value} is outside the supported range {min_year}..={max_year}")]
    FiledDateOutOfRange {
        /// The rejected date.
        value: String,
        /// Earliest accepted year.
        min_year: i32,
        /// Latest accepted year.
        max_year: i32,
    },
}

pub(crate) fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("hard-coded pattern compiles"))
}

fn is_accession_shape(value: &str) -> bool {
    static ACCESSION: OnceLock<Regex> = OnceLock::new();
    value.is_ascii() && static_regex(&ACCESSION, r"^\d{10}-\d{2}-\d{6}$").is_match(value)
}

/// SEC accession number, validated and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Accession(String);

impl Accession {
    /// Parse an accession number, trimming surrounding whitespace.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let trimmed = value.trim();
        if is_accession_shape(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ValidationError::InvalidAccession {
                value: value.to_string(),
            })
        }
    }

    /// Non-failing check used where malformed input is filtered, not rejected.
    pub fn is_valid(value: &str) -> bool {
        is_accession_shape(value.trim())
    }

    /// Borrow the accession string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Accession {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Accession> for String {
    fn from(accession: Accession) -> Self {
        accession.0
    }
}

/// Normalize `P001` / `XEW-P001` style ids to the `XEW-` form.
pub fn normalize_pattern_id(pattern_id: &str) -> Result<String, ValidationError> {
    let trimmed = pattern_id.trim();
    let bare = trimmed.strip_prefix("XEW-").unwrap_or(trimmed);
    if VALID_PATTERN_IDS.contains(&bare) {
        Ok(format!("XEW-{bare}"))
    } else {
        Err(ValidationError::InvalidPatternId {
            value: pattern_id.to_string(),
        })
    }
}

/// Build a stable finding id: `XEW-F-<accession>-<XEW-Pxxx>`.
pub fn finding_id(accession: &Accession, pattern_id: &str) -> Result<String, ValidationError> {
    let pattern = normalize_pattern_id(pattern_id)?;
    Ok(format!("XEW-F-{accession}-{pattern}"))
}

/// Normalize a CIK to ten zero-padded digits.
pub fn normalize_cik(cik: &str) -> Result<String, ValidationError> {
    let trimmed = cik.trim();
    if trimmed.is_empty() || trimmed.len() > 10 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidCik {
            value: cik.to_string(),
        });
    }
    Ok(format!("{trimmed:0>10}"))
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = value.trim();
    let invalid = || ValidationError::InvalidDate {
        field,
        value: value.to_string(),
    };
    if trimmed.len() != 10 {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| invalid())
}

/// Parse a filing date and bound it to EDGAR's lifetime.
pub fn parse_filed_date(value: &str) -> Result<NaiveDate, ValidationError> {
    const MIN_YEAR: i32 = 1990;
    let date = parse_date("filed_date", value)?;
    let max_year = Utc::now().year() + 1;
    if date.year() < MIN_YEAR || date.year() > max_year {
        return Err(ValidationError::FiledDateOutOfRange {
            value: value.trim().to_string(),
            min_year: MIN_YEAR,
            max_year,
        });
    }
    Ok(date)
}
