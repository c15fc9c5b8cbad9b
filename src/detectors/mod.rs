//! Pattern detectors.
//!
//! Each detector inspects one [`FilingModel`] and returns at most one
//! [`Finding`] for its pattern, carrying one instance per distinct canonical
//! signature. The set of detectors is closed: [`Detector`] enumerates them and
//! forwards the [`PatternDetector`] capability to the concrete type.
//!
//! | Pattern | Detector | Priority | Alert-eligible |
//! |---------|----------|----------|----------------|
//! | XEW-P001 | [`DuplicateFactsDetector`] | 1 | yes |
//! | XEW-P002 | [`ExtensionAnchoringDetector`] | 2 | yes |
//! | XEW-P004 | [`NumericTypingDetector`] | 3 | yes |
//! | XEW-P005 | [`TaxonomyReferencesDetector`] | 4 | yes |
//! | XEW-P007 | [`OrphanContextsDetector`] | 5 | no |
//!
//! Detectors never enrich or gate their own findings; the registry does that.

mod numeric;
mod p001;
mod p002;
mod p004;
mod p005;
mod p007;

pub use numeric::Decimal;
pub use p001::DuplicateFactsDetector;
pub use p002::ExtensionAnchoringDetector;
pub use p004::NumericTypingDetector;
pub use p005::TaxonomyReferencesDetector;
pub use p007::OrphanContextsDetector;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::canonical::SignatureError;
use crate::types::{finding_id, Accession, Fact, FilingModel, Finding, Instance, QName, ValidationError};

/// How P001 decides whether duplicate values disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
    /// Exact comparison of normalized values.
    Strict,
    /// Values conflict only if their rounding intervals do not overlap.
    Rounded,
}

impl Default for ConflictMode {
    fn default() -> Self {
        Self::Rounded
    }
}

impl fmt::Display for ConflictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Rounded => write!(f, "rounded"),
        }
    }
}

impl FromStr for ConflictMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "rounded" => Ok(Self::Rounded),
            other => Err(format!("unknown conflict mode {other:?} (expected strict or rounded)")),
        }
    }
}

/// Detector failure. The registry tags it with the pattern id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectorError {
    /// Signature encoding failed.
    #[error("signature encoding failed: {0}")]
    Signature(#[from] SignatureError),
    /// Identifier validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Everything a detector may read.
#[derive(Debug, Clone)]
pub struct DetectorContext<'a> {
    /// Parsed filing.
    pub model: &'a FilingModel,
    /// Accession of the filing under analysis.
    pub accession: Accession,
    /// Ten-digit CIK.
    pub cik: String,
    /// Normalized form type.
    pub form: String,
    /// Filing date, `YYYY-MM-DD`.
    pub filed_date: String,
    /// Primary document on disk.
    pub primary_document_path: PathBuf,
    /// Directory holding the filing's artifacts.
    pub artifacts_dir: PathBuf,
    /// P001 conflict mode.
    pub conflict_mode: ConflictMode,
}

impl<'a> DetectorContext<'a> {
    /// Minimal context for a model and accession.
    pub fn new(model: &'a FilingModel, accession: Accession) -> Self {
        Self {
            model,
            accession,
            cik: String::new(),
            form: String::new(),
            filed_date: String::new(),
            primary_document_path: PathBuf::new(),
            artifacts_dir: PathBuf::new(),
            conflict_mode: ConflictMode::default(),
        }
    }

    /// Set filer metadata.
    pub fn with_filing(mut self, cik: impl Into<String>, form: impl Into<String>, filed_date: impl Into<String>) -> Self {
        self.cik = cik.into();
        self.form = form.into();
        self.filed_date = filed_date.into();
        self
    }

    /// Set on-disk locations.
    pub fn with_paths(mut self, primary_document_path: PathBuf, artifacts_dir: PathBuf) -> Self {
        self.primary_document_path = primary_document_path;
        self.artifacts_dir = artifacts_dir;
        self
    }

    /// Set the P001 conflict mode.
    pub fn with_conflict_mode(mut self, mode: ConflictMode) -> Self {
        self.conflict_mode = mode;
        self
    }
}

/// Capability shared by every detector.
pub trait PatternDetector {
    /// `XEW-Pxxx`.
    fn pattern_id(&self) -> &'static str;

    /// Human-readable name.
    fn pattern_name(&self) -> &'static str;

    /// Whether findings may raise alerts.
    fn alert_eligible(&self) -> bool {
        true
    }

    /// Priority when registered without an override. Lower wins.
    fn default_priority(&self) -> u32;

    /// Break-trigger ids this pattern is exposed to.
    fn break_triggers(&self) -> &'static [&'static str];

    /// Cheap precondition check; `false` skips the detector.
    fn should_run(&self, _ctx: &DetectorContext<'_>) -> bool {
        true
    }

    /// Run detection.
    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Finding>, DetectorError>;
}

/// Closed set of detectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detector {
    /// XEW-P001.
    DuplicateFacts(DuplicateFactsDetector),
    /// XEW-P002.
    ExtensionAnchoring(ExtensionAnchoringDetector),
    /// XEW-P004.
    NumericTyping(NumericTypingDetector),
    /// XEW-P005.
    TaxonomyReferences(TaxonomyReferencesDetector),
    /// XEW-P007.
    OrphanContexts(OrphanContextsDetector),
}

impl Detector {
    /// Every detector with its default settings.
    pub fn all() -> Vec<Self> {
        vec![
            Self::DuplicateFacts(DuplicateFactsDetector),
            Self::ExtensionAnchoring(ExtensionAnchoringDetector),
            Self::NumericTyping(NumericTypingDetector),
            Self::TaxonomyReferences(TaxonomyReferencesDetector),
            Self::OrphanContexts(OrphanContextsDetector),
        ]
    }

    fn inner(&self) -> &dyn PatternDetector {
        match self {
            Self::DuplicateFacts(d) => d,
            Self::ExtensionAnchoring(d) => d,
            Self::NumericTyping(d) => d,
            Self::TaxonomyReferences(d) => d,
            Self::OrphanContexts(d) => d,
        }
    }
}

impl PatternDetector for Detector {
    fn pattern_id(&self) -> &'static str {
        self.inner().pattern_id()
    }

    fn pattern_name(&self) -> &'static str {
        self.inner().pattern_name()
    }

    fn alert_eligible(&self) -> bool {
        self.inner().alert_eligible()
    }

    fn default_priority(&self) -> u32 {
        self.inner().default_priority()
    }

    fn break_triggers(&self) -> &'static [&'static str] {
        self.inner().break_triggers()
    }

    fn should_run(&self, ctx: &DetectorContext<'_>) -> bool {
        self.inner().should_run(ctx)
    }

    fn detect(&self, ctx: &DetectorContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        self.inner().detect(ctx)
    }
}

/// Wrap instances into the detector's single finding, or nothing if empty.
pub(crate) fn single_finding<D: PatternDetector + ?Sized>(
    detector: &D,
    ctx: &DetectorContext<'_>,
    instances: Vec<Instance>,
    mechanism: &str,
    why_not_fatal_yet: &str,
) -> Result<Vec<Finding>, DetectorError> {
    if instances.is_empty() {
        return Ok(Vec::new());
    }
    let id = finding_id(&ctx.accession, detector.pattern_id())?;
    let finding = Finding::new(id, detector.pattern_id(), detector.pattern_name(), detector.alert_eligible())
        .with_narrative(mechanism, why_not_fatal_yet)
        .with_instances(instances);
    Ok(vec![finding])
}

/// `{clark, namespace, local_name}` view of a qualified name.
pub(crate) fn qname_json(qname: &QName) -> Value {
    json!({
        "clark": qname.clark(),
        "namespace": qname.namespace,
        "local_name": qname.local_name,
    })
}

/// Compact fact reference used in instance evidence.
pub(crate) fn fact_ref(fact: &Fact) -> Value {
    let mut obj = Map::new();
    obj.insert("concept".into(), qname_json(&fact.concept));
    obj.insert(
        "context_ref".into(),
        Value::from(fact.context_ref.clone().unwrap_or_default()),
    );
    if let Some(unit) = &fact.unit_ref {
        obj.insert("unit_ref".into(), Value::from(unit.clone()));
    }
    if let Some(value) = &fact.value {
        obj.insert("value".into(), Value::from(value.clone()));
    }
    if fact.is_nil {
        obj.insert("is_nil".into(), Value::Bool(true));
    }
    if let Some(d) = &fact.decimals {
        obj.insert("decimals".into(), Value::from(d.clone()));
    }
    if let Some(p) = &fact.precision {
        obj.insert("precision".into(), Value::from(p.clone()));
    }
    Value::Object(obj)
}

/// Sort key for fact evidence: context, unit, value.
pub(crate) fn fact_sort_key(fact: &Fact) -> (String, String, String) {
    (
        fact.context_ref.clone().unwrap_or_default(),
        fact.unit_ref.clone().unwrap_or_default(),
        fact.value.clone().unwrap_or_default(),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::types::*;

    pub const US_GAAP: &str = "http://fasb.org/us-gaap/2024";
    pub const ACME: &str = "http://acme.com/20240630";
    pub const ISO4217: &str = "http://www.xbrl.org/2003/iso4217";
    pub const XBRLI: &str = "http://www.xbrl.org/2003/instance";

    pub fn accession() -> Accession {
        Accession::parse("0000123456-24-000001").unwrap()
    }

    pub fn context(id: &str, date: &str) -> Context {
        Context {
            id: id.into(),
            entity_scheme: "http://www.sec.gov/CIK".into(),
            entity_identifier: "0000123456".into(),
            period: Period::Instant {
                date: Some(date.into()),
            },
            dimensions: Vec::new(),
        }
    }

    pub fn usd() -> Unit {
        Unit {
            id: "usd".into(),
            measures: vec![QName::new(ISO4217, "USD")],
        }
    }

    pub fn pure() -> Unit {
        Unit {
            id: "pure".into(),
            measures: vec![QName::new(XBRLI, "pure")],
        }
    }

    pub fn concept(ns: &str, name: &str, type_name: &str, period_type: &str) -> Concept {
        Concept {
            qname: QName::new(ns, name),
            type_name: Some(type_name.into()),
            period_type: Some(period_type.into()),
            is_abstract: false,
        }
    }

    pub fn numeric_fact(ns: &str, name: &str, ctx: &str, value: &str, decimals: Option<&str>) -> Fact {
        Fact {
            concept: QName::new(ns, name),
            context_ref: Some(ctx.into()),
            unit_ref: Some("usd".into()),
            value: Some(value.into()),
            is_nil: false,
            is_numeric: true,
            decimals: decimals.map(str::to_string),
            precision: None,
        }
    }

    pub fn text_fact(ns: &str, name: &str, ctx: &str, value: &str) -> Fact {
        Fact {
            concept: QName::new(ns, name),
            context_ref: Some(ctx.into()),
            unit_ref: None,
            value: Some(value.into()),
            is_nil: false,
            is_numeric: false,
            decimals: None,
            precision: None,
        }
    }

    pub fn model_with(facts: Vec<Fact>, contexts: Vec<Context>) -> FilingModel {
        let mut model = FilingModel {
            facts,
            ..FilingModel::default()
        };
        for c in contexts {
            model.contexts.insert(c.id.clone(), c);
        }
        model.units.insert("usd".into(), usd());
        model.units.insert("pure".into(), pure());
        model
    }
}
