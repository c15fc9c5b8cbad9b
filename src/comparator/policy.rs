//! Comparator policy by filing form.
//!
//! Periodic reports (10-Q, 10-K, 20-F) are analysed against a prior filing of
//! the same base form. Event-driven reports (8-K, 6-K) stand alone unless a
//! comparator is supplied. Amendments follow their base form.

use serde::{Deserialize, Serialize};

use super::SelectionError;

const BASE_FORMS: &[(&str, &str)] = &[
    ("10-Q", "10-Q"),
    ("10-Q/A", "10-Q"),
    ("10-K", "10-K"),
    ("10-K/A", "10-K"),
    ("20-F", "20-F"),
    ("20-F/A", "20-F"),
    ("6-K", "6-K"),
    ("6-K/A", "6-K"),
    ("8-K", "8-K"),
    ("8-K/A", "8-K"),
];

const PERIODIC_FORMS: &[&str] = &["10-Q", "10-K", "20-F"];

/// Policy for one form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparatorPolicy {
    /// Base form with any `/A` removed.
    pub base_form: String,
    /// Whether the form is analysed against a prior filing.
    pub comparator_required: bool,
    /// Short description of the rule.
    pub notes: String,
}

/// Trim and uppercase a form type.
pub fn normalize_form(form: &str) -> Result<String, SelectionError> {
    let value = form.trim().to_ascii_uppercase();
    if value.is_empty() {
        return Err(SelectionError::EmptyForm);
    }
    Ok(value)
}

/// Base form for a supported form type.
pub fn base_form(form: &str) -> Result<&'static str, SelectionError> {
    let normalized = normalize_form(form)?;
    BASE_FORMS
        .iter()
        .find(|(f, _)| *f == normalized)
        .map(|(_, base)| *base)
        .ok_or(SelectionError::UnsupportedForm { form: form.to_string() })
}

/// Policy for `form`.
pub fn comparator_policy(form: &str) -> Result<ComparatorPolicy, SelectionError> {
    let base = base_form(form)?;
    let policy = if PERIODIC_FORMS.contains(&base) {
        ComparatorPolicy {
            base_form: base.to_string(),
            comparator_required: true,
            notes: format!("Compare to the prior {base} (latest /A if present)."),
        }
    } else {
        ComparatorPolicy {
            base_form: base.to_string(),
            comparator_required: false,
            notes: "No comparator by default; event-driven filings are compared only when explicitly provided."
                .to_string(),
        }
    };
    Ok(policy)
}

/// Whether two forms share a base form.
pub fn forms_compatible(primary: &str, comparator: &str) -> Result<bool, SelectionError> {
    Ok(base_form(primary)? == base_form(comparator)?)
}

/// Whether `form` is an amendment.
pub fn is_amendment(form: &str) -> Result<bool, SelectionError> {
    Ok(normalize_form(form)?.ends_with("/A"))
}

/// Every form the policy recognises, amendments included.
pub fn supported_forms() -> Vec<&'static str> {
    BASE_FORMS.iter().map(|(f, _)| *f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periodic_forms_require_comparator() {
        for form in ["10-K", "10-q", " 20-F/A "] {
            assert!(comparator_policy(form).unwrap().comparator_required, "{form}");
        }
        assert_eq!(comparator_policy("10-k/a").unwrap().base_form, "10-K");
    }

    #[test]
    fn test_event_forms_do_not() {
        for form in ["8-K", "6-K/A"] {
            assert!(!comparator_policy(form).unwrap().comparator_required, "{form}");
        }
    }

    #[test]
    fn test_unsupported_and_empty() {
        assert!(matches!(comparator_policy("S-1"), Err(SelectionError::UnsupportedForm { .. })));
        assert!(matches!(comparator_policy("  "), Err(SelectionError::EmptyForm)));
    }

    #[test]
    fn test_compatibility_and_amendments() {
        assert!(forms_compatible("10-K/A", "10-K").unwrap());
        assert!(!forms_compatible("10-Q", "10-K").unwrap());
        assert!(is_amendment("10-k/a").unwrap());
        assert!(!is_amendment("10-K").unwrap());
        assert_eq!(supported_forms().len(), 10);
    }
}
