//! Canonical signature codec and deterministic JSON output.
//!
//! A canonical signature is a versioned, pipe-delimited ASCII byte string
//! built from the semantic fields of a detected instance. Its SHA-256 is the
//! instance identifier, so the exact byte layout is a compatibility contract.
//!
//! ## Layout
//!
//! ```text
//! v1|<pattern>|<field_1>|...|<field_n>
//! ```
//!
//! | Pattern | Fields |
//! |---------|--------|
//! | P001 | concept, entity scheme, entity id, period, dimensions, unit |
//! | P002 | extension concept, sorted issue-code CSV |
//! | P004 | concept, context id, unit, issue code |
//! | P005 | issue code, `schemaRefSha256=<hex>`, `nsSha256=<hex>` |
//! | P007 | entity scheme, entity id, period, dimensions |
//!
//! ## Determinism Guarantees
//!
//! - Unordered collections are sorted before joining, with `;` or `,` as the
//!   inner separator so they never collide with the field separator
//! - Large sets collapse to a labelled digest of their sorted, newline-joined values
//! - Absent optional fields encode as the empty string; field count never varies
//! - Every field must be ASCII; anything else is rejected, never transliterated

use serde::Serialize;
use std::collections::BTreeSet;

use crate::canonical_content::{normalize_text, sha256_hex};
use crate::types::model::{DimensionMember, DimensionValue, FilingModel, Fact, Period};

/// Current signature format version.
pub const SIGNATURE_VERSION: &str = "v1";

/// Signature encoding failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// A field contained non-ASCII bytes.
    #[error("Non-ASCII content in signature field `{field}`")]
    NonAscii {
        /// Field name.
        field: String,
    },
    /// Version tag is not ASCII or contains the separator.
    #[error("Invalid signature version {version:?}")]
    InvalidVersion {
        /// Rejected version.
        version: String,
    },
    /// Period lacks a required date.
    #[error("Period is missing its {which} date")]
    MissingPeriodDate {
        /// `instant`, `start` or `end`.
        which: &'static str,
    },
}

fn ensure_ascii(field: &str, value: &str) -> Result<(), SignatureError> {
    if value.is_ascii() {
        Ok(())
    } else {
        Err(SignatureError::NonAscii {
            field: field.to_string(),
        })
    }
}

/// Encode named fields under an explicit version tag.
pub fn signature_with_version(
    version: &str,
    pattern: &str,
    fields: &[(&str, &str)],
) -> Result<Vec<u8>, SignatureError> {
    if !version.is_ascii() || version.contains('|') || version.is_empty() {
        return Err(SignatureError::InvalidVersion {
            version: version.to_string(),
        });
    }
    ensure_ascii("pattern", pattern)?;

    let mut parts = Vec::with_capacity(fields.len() + 2);
    parts.push(version);
    parts.push(pattern);
    for (name, value) in fields {
        ensure_ascii(name, value)?;
        parts.push(value);
    }
    Ok(parts.join("|").into_bytes())
}

/// Encode named fields under [`SIGNATURE_VERSION`].
pub fn signature(pattern: &str, fields: &[(&str, &str)]) -> Result<Vec<u8>, SignatureError> {
    signature_with_version(SIGNATURE_VERSION, pattern, fields)
}

/// Instance identifier: lowercase hex SHA-256 of the signature bytes.
pub fn instance_id(signature: &[u8]) -> String {
    sha256_hex(signature)
}

/// `instant:<date>` or `duration:<start>..<end>`.
pub fn period_signature(period: &Period) -> Result<String, SignatureError> {
    match period {
        Period::Instant { date } => {
            let date = present(date).ok_or(SignatureError::MissingPeriodDate { which: "instant" })?;
            Ok(format!("instant:{date}"))
        }
        Period::Duration { start, end } => {
            let start = present(start).ok_or(SignatureError::MissingPeriodDate { which: "start" })?;
            let end = present(end).ok_or(SignatureError::MissingPeriodDate { which: "end" })?;
            Ok(format!("duration:{start}..{end}"))
        }
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Typed dimension member: digest of the newline-normalized, trimmed content.
///
/// Typed content may be any Unicode; only its digest enters the signature.
pub fn typed_member_signature(raw: &str) -> String {
    format!("typed:{}", sha256_hex(normalize_text(raw).as_bytes()))
}

/// Sorted `dim=member` pairs joined by `;`. Empty for non-dimensional contexts.
pub fn dimension_signature(dimensions: &[DimensionValue]) -> String {
    let mut pairs: Vec<(String, String)> = dimensions
        .iter()
        .map(|dv| {
            let member = match &dv.member {
                DimensionMember::Explicit(q) => q.clark(),
                DimensionMember::Typed(raw) => typed_member_signature(raw),
            };
            (dv.dimension.clark(), member)
        })
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(d, m)| format!("{d}={m}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// Sorted Clark measures joined by `;`.
///
/// Non-numeric facts and facts without a unit encode as the empty string. A
/// unit reference that does not resolve stands in as a single synthetic measure.
pub fn unit_signature(model: &FilingModel, fact: &Fact) -> String {
    let Some(unit_ref) = fact.unit_ref.as_deref() else {
        return String::new();
    };
    let mut measures: Vec<String> = match model.units.get(unit_ref) {
        Some(unit) if !unit.measures.is_empty() => unit.measures.iter().map(|m| m.clark()).collect(),
        _ => vec![unit_ref.to_string()],
    };
    measures.sort();
    measures.join(";")
}

/// Deduplicated, sorted, comma-joined codes.
pub fn sorted_csv<I, S>(codes: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    codes
        .into_iter()
        .map(|c| c.as_ref().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(",")
}

/// Digest of a set: SHA-256 over the sorted values joined by `\n`.
pub fn sorted_set_digest<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sorted: Vec<String> = values.into_iter().map(|v| v.as_ref().to_string()).collect();
    sorted.sort();
    sorted.dedup();
    sha256_hex(sorted.join("\n").as_bytes())
}

/// P001 duplicate-fact signature.
pub fn p001_signature(
    concept: &str,
    entity_scheme: &str,
    entity_identifier: &str,
    period: &str,
    dimensions: &str,
    unit: &str,
) -> Result<Vec<u8>, SignatureError> {
    signature(
        "P001",
        &[
            ("concept", concept),
            ("entity_scheme", entity_scheme),
            ("entity_identifier", entity_identifier),
            ("period", period),
            ("dimensions", dimensions),
            ("unit", unit),
        ],
    )
}

/// P002 extension-anchoring signature.
pub fn p002_signature(extension_concept: &str, issue_codes: &[&str]) -> Result<Vec<u8>, SignatureError> {
    let codes = sorted_csv(issue_codes.iter());
    signature(
        "P002",
        &[("extension_concept", extension_concept), ("issue_codes", &codes)],
    )
}

/// P004 numeric-typing signature.
pub fn p004_signature(
    concept: &str,
    context_id: &str,
    unit: &str,
    issue_code: &str,
) -> Result<Vec<u8>, SignatureError> {
    signature(
        "P004",
        &[
            ("concept", concept),
            ("context_id", context_id),
            ("unit", unit),
            ("issue_code", issue_code),
        ],
    )
}

/// P005 taxonomy-reference signature.
pub fn p005_signature(
    issue_code: &str,
    schema_refs: &[String],
    namespaces: &[String],
) -> Result<Vec<u8>, SignatureError> {
    let refs = format!("schemaRefSha256={}", sorted_set_digest(schema_refs));
    let ns = format!("nsSha256={}", sorted_set_digest(namespaces));
    signature(
        "P005",
        &[("issue_code", issue_code), ("schema_refs", &refs), ("namespaces", &ns)],
    )
}

/// P007 orphan-context signature.
pub fn p007_signature(
    entity_scheme: &str,
    entity_identifier: &str,
    period: &str,
    dimensions: &str,
) -> Result<Vec<u8>, SignatureError> {
    signature(
        "P007",
        &[
            ("entity_scheme", entity_scheme),
            ("entity_identifier", entity_identifier),
            ("period", period),
            ("dimensions", dimensions),
        ],
    )
}

/// Serialize to pretty JSON with sorted keys and a trailing newline.
///
/// Keys sort because values pass through `serde_json::Value`, whose maps are
/// ordered. Struct field order therefore never leaks into output.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    let mut text = serde_json::to_string_pretty(&value)?;
    text.push('\n');
    Ok(text)
}
