//! Parsed filing model handed over by the XBRL parsing collaborator.
//!
//! The kernel never parses XML. It consumes this already-resolved view of a
//! filing (facts, contexts, units, concept declarations and anchoring
//! relationships) and derives every signature from it. The types
//! deserialize from JSON so a model can be produced by any upstream tool.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Namespace prefixes of standard taxonomies. Anything else is an extension.
pub const STANDARD_NAMESPACE_PREFIXES: &[&str] = &[
    "http://fasb.org/us-gaap/",
    "http://xbrl.sec.gov/",
    "http://xbrl.ifrs.org/",
    "http://www.xbrl.org/",
    "http://www.w3.org/2001/XMLSchema",
];

/// Arcroles that anchor an extension concept to the standard taxonomy.
pub const ANCHORING_ARCROLES: &[&str] = &[
    "http://www.xbrl.org/2003/arcrole/concept-label",
    "http://www.xbrl.org/2003/arcrole/concept-reference",
    "http://xbrl.us/us-gaap/role/label/negated",
];

/// Qualified name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QName {
    /// Namespace URI.
    pub namespace: String,
    /// Local part.
    pub local_name: String,
    /// Document prefix, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl QName {
    /// Create a qualified name without a prefix.
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
            prefix: None,
        }
    }

    /// Clark notation: `{namespace}local_name`.
    pub fn clark(&self) -> String {
        format!("{{{}}}{}", self.namespace, self.local_name)
    }

    /// Whether the namespace belongs to a standard taxonomy.
    pub fn is_standard(&self) -> bool {
        is_standard_namespace(&self.namespace)
    }
}

/// Whether a namespace URI belongs to a standard taxonomy.
pub fn is_standard_namespace(namespace: &str) -> bool {
    STANDARD_NAMESPACE_PREFIXES
        .iter()
        .any(|prefix| namespace.starts_with(prefix))
}

/// Context period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Period {
    /// Point in time.
    Instant {
        /// `YYYY-MM-DD`, if resolved.
        #[serde(default)]
        date: Option<String>,
    },
    /// Date range.
    Duration {
        /// Start date.
        #[serde(default)]
        start: Option<String>,
        /// End date.
        #[serde(default)]
        end: Option<String>,
    },
}

/// Member of a dimension in a context's segment or scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DimensionMember {
    /// Explicit domain member.
    Explicit(QName),
    /// Typed member carrying raw content.
    Typed(String),
}

/// One dimension/member pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionValue {
    /// Dimension concept.
    pub dimension: QName,
    /// Member.
    pub member: DimensionMember,
}

/// XBRL context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Context id as written in the instance.
    pub id: String,
    /// Entity identifier scheme.
    pub entity_scheme: String,
    /// Entity identifier.
    pub entity_identifier: String,
    /// Reporting period.
    pub period: Period,
    /// Dimensional qualifiers.
    #[serde(default)]
    pub dimensions: Vec<DimensionValue>,
}

/// Unit of measure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Unit id.
    pub id: String,
    /// Measures, numerator and denominator flattened.
    #[serde(default)]
    pub measures: Vec<QName>,
}

/// Concept declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    /// Concept name.
    pub qname: QName,
    /// Declared item type, e.g. `xbrli:monetaryItemType`.
    #[serde(default)]
    pub type_name: Option<String>,
    /// `instant` or `duration`.
    #[serde(default)]
    pub period_type: Option<String>,
    /// Abstract flag.
    #[serde(default)]
    pub is_abstract: bool,
}

/// Reported fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// Concept the fact reports.
    pub concept: QName,
    /// Referenced context id.
    #[serde(default)]
    pub context_ref: Option<String>,
    /// Referenced unit id.
    #[serde(default)]
    pub unit_ref: Option<String>,
    /// Lexical value.
    #[serde(default)]
    pub value: Option<String>,
    /// `xsi:nil` flag.
    #[serde(default)]
    pub is_nil: bool,
    /// Numeric fact flag from the parser.
    #[serde(default)]
    pub is_numeric: bool,
    /// Raw `decimals` attribute.
    #[serde(default)]
    pub decimals: Option<String>,
    /// Raw `precision` attribute.
    #[serde(default)]
    pub precision: Option<String>,
}

impl Fact {
    /// A fact is numeric if flagged so or if it carries a unit.
    pub fn is_numeric(&self) -> bool {
        self.is_numeric || self.unit_ref.is_some()
    }

    /// Non-empty context reference.
    pub fn context_id(&self) -> Option<&str> {
        self.context_ref.as_deref().filter(|c| !c.is_empty())
    }
}

/// Label/reference relationship from a concept to a target concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRelationship {
    /// Arcrole URI.
    pub arcrole: String,
    /// Source concept.
    pub from: QName,
    /// Target concept.
    pub to: QName,
}

impl AnchorRelationship {
    /// Whether the arcrole counts as anchoring.
    pub fn is_anchoring(&self) -> bool {
        ANCHORING_ARCROLES.contains(&self.arcrole.as_str())
    }
}

/// Complete parsed filing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingModel {
    /// Facts in document order.
    #[serde(default)]
    pub facts: Vec<Fact>,
    /// Contexts keyed by id.
    #[serde(default)]
    pub contexts: BTreeMap<String, Context>,
    /// Units keyed by id.
    #[serde(default)]
    pub units: BTreeMap<String, Unit>,
    /// Concept declarations keyed by Clark name.
    #[serde(default)]
    pub concepts: BTreeMap<String, Concept>,
    /// Label and reference relationships.
    #[serde(default)]
    pub anchor_relationships: Vec<AnchorRelationship>,
    /// `schemaRef` hrefs from the instance.
    #[serde(default)]
    pub schema_refs: Vec<String>,
    /// targetNamespace and imported namespaces of the referenced schemas.
    #[serde(default)]
    pub declared_namespaces: Vec<String>,
}

impl FilingModel {
    /// Look up a concept declaration by name.
    pub fn concept(&self, qname: &QName) -> Option<&Concept> {
        self.concepts.get(&qname.clark())
    }

    /// Context referenced by a fact.
    pub fn context_of(&self, fact: &Fact) -> Option<&Context> {
        fact.context_id().and_then(|id| self.contexts.get(id))
    }

    /// Unit referenced by a fact.
    pub fn unit_of(&self, fact: &Fact) -> Option<&Unit> {
        fact.unit_ref.as_deref().and_then(|id| self.units.get(id))
    }

    /// Trimmed, deduplicated, sorted schema refs.
    pub fn normalized_schema_refs(&self) -> Vec<String> {
        self.schema_refs
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Clark names of declared extension concepts.
    pub fn extension_qnames(&self) -> BTreeSet<String> {
        self.concepts
            .values()
            .filter(|c| !c.qname.is_standard())
            .map(|c| c.qname.clark())
            .collect()
    }
}
