//! Core types shared by detectors, the registry, markers and the pack writer.

pub mod citation;
pub mod finding;
pub mod identifiers;
pub mod model;

pub use citation::{CitationError, RuleBasisCitation};
pub use finding::{BreakTrigger, Finding, FindingStatus, Instance, BREAK_TRIGGER_CATALOG};
pub use identifiers::{
    finding_id, normalize_cik, normalize_pattern_id, parse_date, parse_filed_date, Accession,
    ValidationError, VALID_PATTERN_IDS,
};
pub use model::{
    AnchorRelationship, Concept, Context, DimensionMember, DimensionValue, Fact, FilingModel,
    Period, QName, Unit, ANCHORING_ARCROLES, STANDARD_NAMESPACE_PREFIXES,
};
