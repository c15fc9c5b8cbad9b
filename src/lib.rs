//! # xew-evidence-kernel
//!
//! Deterministic Evidence Packs for SEC XBRL filings.
//!
//! The kernel answers one question:
//!
//! > Given a parsed filing, which structural defects does it carry, and can a
//! > third party reproduce exactly that answer from the bundle we hand over?
//!
//! ## Core Contract
//!
//! 1. Every finding instance has a stable id derived from a canonical signature
//! 2. Findings without a valid rule-basis citation are never alert-eligible
//! 3. Every file in a pack is listed with its digest; the pack digest covers them all
//!
//! ## Architecture
//!
//! ```text
//! FilingModel → PatternRegistry → gate → priority selection ─┐
//!      │              (P001..P007)                          │
//!      └→ FilingSnapshot → MarkerEngine (M001..M005) ───────┤
//! history → comparator selection ───────────────────────────┤
//!                                                            ↓
//!                          FindingsWriter → PackManifestBuilder → pack dir
//!                                                            ↓
//!                                                       verify_pack
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same model + same config → byte-identical `xew_findings.json`
//! - Instance ids depend on field content, never on field order
//! - `pack_sha256` depends on the set of files, never on insertion order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod canonical_content;
pub mod comparator;
pub mod config;
pub mod detectors;
pub mod findings;
pub mod markers;
pub mod pack;
pub mod registry;
pub mod types;

// Re-exports
pub use canonical::{instance_id, signature, signature_with_version, to_canonical_json, SignatureError, SIGNATURE_VERSION};
pub use canonical_content::{sha256_file, sha256_hex, HashValidation};
pub use comparator::{select_comparator_and_history, HistoryEntry, SelectionError, SelectionMetadata, SelectionReason};
pub use config::{ConfigError, EngineConfig};
pub use detectors::{ConflictMode, Detector, DetectorContext, DetectorError, PatternDetector};
pub use findings::{FindingsDocument, FindingsError, FindingsWriter, FINDINGS_SCHEMA_ID, FINDINGS_SCHEMA_VERSION};
pub use markers::{FilingSnapshot, Marker, MarkerEngine, MarkerError, MarkerThresholds};
pub use pack::{
    verify_pack, AssemblyError, HistoryFiling, ManifestError, PackAssembler, PackManifest, PackManifestBuilder,
    PackRequest, PackSummary, VerificationReport, VerifyError, VerifyMode, VerifyOptions,
};
pub use registry::{DetectionOutcome, PatternRegistry, RegistryError};
pub use types::{Accession, BreakTrigger, Finding, FindingStatus, FilingModel, Instance, RuleBasisCitation, ValidationError};
