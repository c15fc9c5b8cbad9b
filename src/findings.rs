//! `xew_findings.json` writer.
//!
//! The document is a pure function of its inputs plus `generated_at`, which
//! callers pin to the pack's retrieval time (tests pin it to a constant).
//! Findings are ordered by id, instances by instance id, and each finding's
//! instance list is truncated at the configured limit with the full count
//! kept alongside.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::canonical::to_canonical_json;
use crate::config::{EngineConfig, DEFAULT_INSTANCE_LIMIT};
use crate::markers::{sort_markers, Marker};
use crate::pack::{utc_now_iso, FileRole, ManifestEntry};
use crate::types::{BreakTrigger, Finding, FindingStatus, Instance, RuleBasisCitation};

/// `schema_id` of the findings document.
pub const FINDINGS_SCHEMA_ID: &str = "cmdrvl.xew_findings";

/// `schema_version` of the findings document.
pub const FINDINGS_SCHEMA_VERSION: &str = "1.0";

/// Engine version recorded in the toolchain block.
pub const XEW_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Findings writer failure.
#[derive(Debug, thiserror::Error)]
pub enum FindingsError {
    /// Serialization failed.
    #[error("Failed to serialize findings: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The document could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Toolchain block; also written as `toolchain/toolchain.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolchainInfo {
    /// Engine name.
    pub engine: String,
    /// Engine version.
    pub xew_version: String,
    /// Hash of every output-affecting parameter.
    pub params_hash: String,
    /// The parameters themselves.
    pub config: Value,
}

impl ToolchainInfo {
    /// Record the toolchain for a config.
    pub fn from_config(config: &EngineConfig) -> Result<Self, FindingsError> {
        let mut recorded = config.clone();
        recorded.rule_basis_map = None;
        Ok(Self {
            engine: env!("CARGO_PKG_NAME").to_string(),
            xew_version: XEW_VERSION.to_string(),
            params_hash: config.params_hash(),
            config: serde_json::to_value(&recorded)?,
        })
    }
}

/// Comparator filing recorded in the input block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparatorRef {
    /// Accession.
    pub accession: String,
    /// EDGAR URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_document_url: Option<String>,
    /// Pack-relative path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_artifact_path: Option<String>,
}

/// The filing under analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMetadata {
    /// Ten-digit CIK.
    pub cik: String,
    /// Accession.
    pub accession: String,
    /// Form type.
    pub form: String,
    /// `YYYY-MM-DD`.
    pub filed_date: String,
    /// EDGAR URL of the primary document.
    pub primary_document_url: String,
    /// Pack-relative path of the primary document.
    pub primary_artifact_path: String,
    /// Registrant name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_name: Option<String>,
    /// Document period end date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<String>,
    /// Comparator, when one was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparator: Option<ComparatorRef>,
}

/// Artifact listed in the findings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Pack-relative path.
    pub path: String,
    /// File role.
    pub role: FileRole,
    /// UTC retrieval time.
    pub retrieved_at: String,
    /// SHA-256.
    pub sha256: String,
    /// Size.
    pub bytes: u64,
    /// MIME type guessed from the extension.
    pub content_type: String,
    /// Fetch URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl ArtifactRef {
    /// Artifact record for a manifest entry.
    pub fn from_entry(entry: &ManifestEntry, retrieved_at: &str) -> Self {
        Self {
            path: entry.path.clone(),
            role: entry.role,
            retrieved_at: retrieved_at.to_string(),
            sha256: entry.sha256.clone(),
            bytes: entry.bytes,
            content_type: content_type_for(&entry.path).to_string(),
            source_url: entry.source_url.clone(),
        }
    }
}

/// MIME type by file extension.
pub fn content_type_for(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "htm" | "html" => "text/html",
        "xml" | "xsd" => "application/xml",
        "json" => "application/json",
        "txt" => "text/plain",
        "zip" => "application/zip",
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Instance block of a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observed {
    /// Instances the detector produced.
    pub instance_count_total: usize,
    /// Instances written.
    pub instance_count_included: usize,
    /// Whether instances were dropped.
    pub truncated: bool,
    /// Written instances, sorted by id.
    pub instances: Vec<Instance>,
}

/// A finding as it appears in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingRecord {
    /// Finding id.
    pub finding_id: String,
    /// Pattern id.
    pub pattern_id: String,
    /// Pattern name.
    pub pattern_name: String,
    /// Alert eligibility after gating.
    pub alert_eligible: bool,
    /// Detected or suppressed.
    pub status: FindingStatus,
    /// Why suppressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_reason: Option<String>,
    /// Whether human review is required.
    pub human_review_required: bool,
    /// Break triggers, sorted by id.
    pub break_triggers: Vec<BreakTrigger>,
    /// Citations, sorted by `(source, citation)`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_basis: Vec<RuleBasisCitation>,
    /// Instances.
    pub observed: Observed,
    /// How the defect arises.
    pub mechanism: String,
    /// Why filings still pass today.
    pub why_not_fatal_yet: String,
}

impl FindingRecord {
    /// Document form of a finding, keeping at most `instance_limit` instances.
    pub fn from_finding(finding: &Finding, instance_limit: usize) -> Self {
        let mut instances = finding.instances.clone();
        instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        let total = instances.len();
        instances.truncate(instance_limit);
        if instances.len() < total {
            debug!(
                finding_id = %finding.finding_id,
                total,
                included = instances.len(),
                "truncated finding instances"
            );
        }

        let mut break_triggers = finding.break_triggers.clone();
        break_triggers.sort_by(|a, b| a.id.cmp(&b.id));
        let mut rule_basis = finding.rule_basis.clone();
        rule_basis.sort_by(|a, b| (&a.source, &a.citation).cmp(&(&b.source, &b.citation)));

        Self {
            finding_id: finding.finding_id.clone(),
            pattern_id: finding.pattern_id.clone(),
            pattern_name: finding.pattern_name.clone(),
            alert_eligible: finding.alert_eligible,
            status: finding.status,
            suppression_reason: finding.suppression_reason.clone(),
            human_review_required: finding.human_review_required,
            break_triggers,
            rule_basis,
            observed: Observed {
                instance_count_total: total,
                instance_count_included: instances.len(),
                truncated: instances.len() < total,
                instances,
            },
            mechanism: finding.mechanism.clone(),
            why_not_fatal_yet: finding.why_not_fatal_yet.clone(),
        }
    }
}

/// Complete findings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingsDocument {
    /// Always [`FINDINGS_SCHEMA_ID`].
    pub schema_id: String,
    /// Always [`FINDINGS_SCHEMA_VERSION`].
    pub schema_version: String,
    /// UTC generation time.
    pub generated_at: String,
    /// Toolchain block.
    pub toolchain: ToolchainInfo,
    /// Filing under analysis.
    pub input: InputMetadata,
    /// Pack artifacts, sorted by path.
    pub artifacts: Vec<ArtifactRef>,
    /// Findings, sorted by id.
    pub findings: Vec<FindingRecord>,
    /// Markers, when any fired.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<Marker>,
    /// Extension metadata such as comparator selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

/// Builds and writes findings documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingsWriter {
    instance_limit: usize,
    generated_at: Option<String>,
}

impl Default for FindingsWriter {
    fn default() -> Self {
        Self::new(DEFAULT_INSTANCE_LIMIT)
    }
}

impl FindingsWriter {
    /// Writer with an instance limit per finding.
    pub fn new(instance_limit: usize) -> Self {
        Self {
            instance_limit,
            generated_at: None,
        }
    }

    /// Pin `generated_at`.
    pub fn generated_at(mut self, timestamp: impl Into<String>) -> Self {
        self.generated_at = Some(timestamp.into());
        self
    }

    /// Assemble the document.
    pub fn document(
        &self,
        toolchain: ToolchainInfo,
        input: InputMetadata,
        mut artifacts: Vec<ArtifactRef>,
        findings: &[Finding],
        mut markers: Vec<Marker>,
        ext: Option<Value>,
    ) -> FindingsDocument {
        let mut records: Vec<FindingRecord> = findings
            .iter()
            .map(|f| FindingRecord::from_finding(f, self.instance_limit))
            .collect();
        records.sort_by(|a, b| a.finding_id.cmp(&b.finding_id));
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        sort_markers(&mut markers);

        FindingsDocument {
            schema_id: FINDINGS_SCHEMA_ID.to_string(),
            schema_version: FINDINGS_SCHEMA_VERSION.to_string(),
            generated_at: self.generated_at.clone().unwrap_or_else(utc_now_iso),
            toolchain,
            input,
            artifacts,
            findings: records,
            markers,
            ext,
        }
    }

    /// Write a document as canonical JSON.
    pub fn write(&self, document: &FindingsDocument, path: &Path) -> Result<(), FindingsError> {
        let text = to_canonical_json(document)?;
        std::fs::write(path, text).map_err(|source| FindingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            path = %path.display(),
            finding_count = document.findings.len(),
            marker_count = document.markers.len(),
            "wrote findings document"
        );
        Ok(())
    }
}
