//! Pack assembly: copy artifacts, run detection and markers, write outputs.
//!
//! The assembler owns the whole write path. It validates the filing
//! identity up front, refuses to write into a directory that already holds
//! anything, and writes the manifest last so a pack without one is visibly
//! incomplete.

use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use super::layout::{role_for_path, PackLayout, ARTIFACTS_DIR, FINDINGS_FILE, TOOLCHAIN_FILE};
use super::manifest::PackManifestBuilder;
use super::{utc_now_iso, ManifestError};
use crate::canonical::to_canonical_json;
use crate::comparator::{base_form, select_comparator_and_history, HistoryEntry, SelectionError};
use crate::config::EngineConfig;
use crate::detectors::DetectorContext;
use crate::findings::{ArtifactRef, ComparatorRef, FindingsError, FindingsWriter, InputMetadata, ToolchainInfo};
use crate::markers::{FilingSnapshot, MarkerEngine, MarkerError};
use crate::registry::{PatternRegistry, RegistryError};
use crate::types::{normalize_cik, parse_date, parse_filed_date, Accession, FilingModel, ValidationError};

/// Where a copied rule-basis map lands in the pack.
pub const RULE_BASIS_MAP_FILE: &str = "toolchain/rule_basis_map.json";

/// Pack assembly failure.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// Output directory already has content.
    #[error("Output directory is not empty: {}", path.display())]
    OutputNotEmpty {
        /// Output directory.
        path: PathBuf,
    },
    /// An input file does not exist.
    #[error("Input file not found: {}", path.display())]
    MissingInput {
        /// Missing input.
        path: PathBuf,
    },
    /// Copying or writing failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Filing identity is invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Form or history selection failed.
    #[error(transparent)]
    Selection(#[from] SelectionError),
    /// Detection failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Marker computation failed.
    #[error(transparent)]
    Marker(#[from] MarkerError),
    /// Findings document could not be written.
    #[error(transparent)]
    Findings(#[from] FindingsError),
    /// Manifest could not be built.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// Serialization failed.
    #[error("Failed to serialize pack output: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A prior filing supplied with the request.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryFiling {
    /// Identity offered to comparator selection.
    pub entry: HistoryEntry,
    /// Local primary document to copy into the pack.
    pub primary_path: Option<PathBuf>,
    /// Parsed model, used for marker snapshots.
    pub model: Option<FilingModel>,
    /// Pre-computed snapshot; takes precedence over `model`.
    pub snapshot: Option<FilingSnapshot>,
}

impl HistoryFiling {
    /// History filing with only an index entry.
    pub fn new(entry: HistoryEntry) -> Self {
        Self {
            entry,
            primary_path: None,
            model: None,
            snapshot: None,
        }
    }

    /// Attach a parsed model.
    pub fn with_model(mut self, model: FilingModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Attach a snapshot.
    pub fn with_snapshot(mut self, snapshot: FilingSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Attach a local primary document.
    pub fn with_primary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.primary_path = Some(path.into());
        self
    }
}

/// Everything needed to build one pack.
#[derive(Debug, Clone, Default)]
pub struct PackRequest {
    /// Caller-chosen pack id.
    pub pack_id: String,
    /// Output directory; must be absent or empty.
    pub out_dir: PathBuf,
    /// CIK, padded to ten digits on output.
    pub cik: String,
    /// Accession of the filing.
    pub accession: String,
    /// Form type.
    pub form: String,
    /// `YYYY-MM-DD`.
    pub filed_date: String,
    /// Local primary document.
    pub primary_path: PathBuf,
    /// EDGAR URL of the primary document.
    pub primary_document_url: String,
    /// Further files copied under `artifacts/` by file name.
    pub artifacts: Vec<PathBuf>,
    /// Parsed filing.
    pub model: FilingModel,
    /// Prior filings.
    pub history: Vec<HistoryFiling>,
    /// Comparator chosen by the caller.
    pub comparator: Option<HistoryEntry>,
    /// Registrant name.
    pub issuer_name: Option<String>,
    /// Document period end, `YYYY-MM-DD`.
    pub period_end: Option<String>,
    /// Retrieval time; defaults to now. Also used as `generated_at`.
    pub retrieved_at: Option<String>,
}

/// Result of a successful assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSummary {
    /// Pack root.
    pub pack_dir: PathBuf,
    /// Digest recorded in the manifest.
    pub pack_sha256: String,
    /// Files listed in the manifest.
    pub file_count: usize,
    /// Findings written.
    pub finding_count: usize,
    /// Markers written.
    pub marker_count: usize,
}

/// Validated filing identity.
struct Identity {
    cik: String,
    accession: Accession,
    form: String,
    filed_date: String,
    period_end: Option<String>,
}

impl Identity {
    fn validate(request: &PackRequest) -> Result<Self, AssemblyError> {
        let cik = normalize_cik(&request.cik)?;
        let accession = Accession::parse(&request.accession)?;
        base_form(&request.form)?;
        let form = request.form.trim().to_ascii_uppercase();
        let filed_date = parse_filed_date(&request.filed_date)?.format("%Y-%m-%d").to_string();
        let period_end = request
            .period_end
            .as_deref()
            .map(|d| parse_date("period_end", d).map(|d| d.format("%Y-%m-%d").to_string()))
            .transpose()?;
        Ok(Self {
            cik,
            accession,
            form,
            filed_date,
            period_end,
        })
    }
}

/// Builds Evidence Packs with one registry and config.
#[derive(Debug)]
pub struct PackAssembler {
    config: EngineConfig,
    registry: PatternRegistry,
}

impl PackAssembler {
    /// Assembler with an explicit registry.
    pub fn new(config: EngineConfig, registry: PatternRegistry) -> Self {
        Self { config, registry }
    }

    /// Assembler with the default detectors and the config's rule-basis map.
    pub fn from_config(config: EngineConfig) -> Result<Self, AssemblyError> {
        let mut registry = PatternRegistry::with_default_detectors();
        if let Some(path) = &config.rule_basis_map {
            let loaded = registry.load_rule_basis_map(path)?;
            info!(path = %path.display(), patterns = loaded, "loaded rule basis map");
        }
        Ok(Self::new(config, registry))
    }

    /// Engine config in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registry in use.
    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// Build a pack from `request`.
    pub fn assemble(&self, request: &PackRequest) -> Result<PackSummary, AssemblyError> {
        let identity = Identity::validate(request)?;
        prepare_output_dir(&request.out_dir)?;
        let layout = PackLayout::new(&request.out_dir);
        let retrieved_at = request.retrieved_at.clone().unwrap_or_else(utc_now_iso);
        let mut builder = PackManifestBuilder::new(&request.pack_id).retrieved_at(&retrieved_at);

        // Artifacts
        let primary_rel = PackLayout::primary_relative();
        copy_into(&layout, &primary_rel, &request.primary_path)?;
        builder.add_file(
            &primary_rel,
            role_for_path(&primary_rel),
            &layout.resolve(&primary_rel),
            Some(request.primary_document_url.clone()),
        )?;
        for source in &request.artifacts {
            let name = source.file_name().ok_or_else(|| AssemblyError::MissingInput { path: source.clone() })?;
            let rel = PackLayout::artifact_relative(Path::new(name))?;
            if builder.entries().iter().any(|e| e.path == rel) {
                return Err(ManifestError::DuplicatePath { path: rel }.into());
            }
            copy_into(&layout, &rel, source)?;
            builder.add_file(&rel, role_for_path(&rel), &layout.resolve(&rel), None)?;
        }

        // Comparator and history window
        let entries: Vec<HistoryEntry> = request.history.iter().map(|h| h.entry.clone()).collect();
        let selection = select_comparator_and_history(
            &identity.form,
            request.comparator.as_ref(),
            &entries,
            identity.accession.as_str(),
            self.config.history_window_max,
        )?;
        let mut window = selection.history_window.clone();
        for entry in &mut window {
            let Some(filing) = find_history(&request.history, &entry.accession) else {
                continue;
            };
            if let Some(source) = &filing.primary_path {
                let rel = PackLayout::history_primary_relative(&entry.accession);
                copy_into(&layout, &rel, source)?;
                builder.add_file(&rel, role_for_path(&rel), &layout.resolve(&rel), entry.primary_document_url.clone())?;
                entry.primary_artifact_path = Some(rel);
            }
        }

        // Detection
        let ctx = DetectorContext::new(&request.model, identity.accession.clone())
            .with_filing(&identity.cik, &identity.form, &identity.filed_date)
            .with_paths(layout.resolve(&primary_rel), layout.resolve(ARTIFACTS_DIR))
            .with_conflict_mode(self.config.p001_conflict_mode);
        let outcome = self.registry.run_with_priority_selection(&ctx, None).map_err(|e| {
            error!(accession = %identity.accession, error = %e, "detection failed");
            e
        })?;

        // Markers
        let snapshots: Vec<FilingSnapshot> = window
            .iter()
            .filter_map(|entry| self.history_snapshot(&request.history, &entry.accession))
            .collect();
        let current = FilingSnapshot::structural(identity.accession.as_str(), &request.model);
        let engine = MarkerEngine::new(self.config.markers.clone(), self.config.example_limit);
        let markers = engine.compute(&current, &snapshots, &outcome.findings)?;

        // Toolchain
        let toolchain = ToolchainInfo::from_config(&self.config)?;
        write_file(&layout.toolchain_path(), to_canonical_json(&toolchain)?.as_bytes())?;
        builder.add_file(TOOLCHAIN_FILE, role_for_path(TOOLCHAIN_FILE), &layout.toolchain_path(), None)?;
        if let Some(map) = &self.config.rule_basis_map {
            copy_into(&layout, RULE_BASIS_MAP_FILE, map)?;
            builder.add_file(
                RULE_BASIS_MAP_FILE,
                role_for_path(RULE_BASIS_MAP_FILE),
                &layout.resolve(RULE_BASIS_MAP_FILE),
                None,
            )?;
        }

        // Findings
        let artifacts: Vec<ArtifactRef> = builder
            .entries()
            .iter()
            .map(|e| ArtifactRef::from_entry(e, &retrieved_at))
            .collect();
        let comparator = selection.comparator.as_ref().map(|c| ComparatorRef {
            accession: c.accession.clone(),
            primary_document_url: c.primary_document_url.clone(),
            primary_artifact_path: window
                .iter()
                .find(|w| w.accession == c.accession)
                .and_then(|w| w.primary_artifact_path.clone()),
        });
        let input = InputMetadata {
            cik: identity.cik.clone(),
            accession: identity.accession.to_string(),
            form: identity.form.clone(),
            filed_date: identity.filed_date.clone(),
            primary_document_url: request.primary_document_url.clone(),
            primary_artifact_path: primary_rel.clone(),
            issuer_name: request.issuer_name.clone(),
            period_end: identity.period_end.clone(),
            comparator,
        };
        let ext = json!({
            "comparator_selection": selection.metadata,
            "history_window": window,
            "selected_finding_id": outcome.selected_finding_id,
        });
        let writer = FindingsWriter::new(self.config.instance_limit).generated_at(&retrieved_at);
        let document = writer.document(toolchain, input, artifacts, &outcome.findings, markers, Some(ext));
        writer.write(&document, &layout.findings_path())?;
        builder.add_file(FINDINGS_FILE, role_for_path(FINDINGS_FILE), &layout.findings_path(), None)?;

        // Manifest
        let manifest = builder.build();
        manifest.write(&layout.manifest_path())?;

        let summary = PackSummary {
            pack_dir: request.out_dir.clone(),
            pack_sha256: manifest.pack_sha256,
            file_count: manifest.files.len(),
            finding_count: document.findings.len(),
            marker_count: document.markers.len(),
        };
        info!(
            pack_id = %request.pack_id,
            accession = %identity.accession,
            pack_dir = %summary.pack_dir.display(),
            pack_sha256 = %summary.pack_sha256,
            files = summary.file_count,
            findings = summary.finding_count,
            markers = summary.marker_count,
            "assembled evidence pack"
        );
        Ok(summary)
    }

    fn history_snapshot(&self, history: &[HistoryFiling], accession: &str) -> Option<FilingSnapshot> {
        let filing = find_history(history, accession)?;
        if let Some(snapshot) = &filing.snapshot {
            return Some(FilingSnapshot {
                accession: accession.to_string(),
                ..snapshot.clone()
            });
        }
        let model = filing.model.as_ref()?;
        Some(FilingSnapshot::from_model(accession, model, &self.registry, self.config.p001_conflict_mode))
    }
}

fn find_history<'a>(history: &'a [HistoryFiling], accession: &str) -> Option<&'a HistoryFiling> {
    history.iter().find(|h| h.entry.accession.trim() == accession)
}

fn prepare_output_dir(dir: &Path) -> Result<(), AssemblyError> {
    let io_err = |source| AssemblyError::Io {
        path: dir.to_path_buf(),
        source,
    };
    if dir.exists() {
        let mut contents = std::fs::read_dir(dir).map_err(io_err)?;
        if contents.next().is_some() {
            error!(path = %dir.display(), "refusing to write into a non-empty directory");
            return Err(AssemblyError::OutputNotEmpty { path: dir.to_path_buf() });
        }
    }
    std::fs::create_dir_all(dir).map_err(io_err)
}

fn copy_into(layout: &PackLayout, relative: &str, source: &Path) -> Result<(), AssemblyError> {
    if !source.is_file() {
        return Err(AssemblyError::MissingInput {
            path: source.to_path_buf(),
        });
    }
    let dest = layout.resolve(relative);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|source| AssemblyError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::copy(source, &dest).map_err(|source| AssemblyError::Io {
        path: dest.clone(),
        source,
    })?;
    debug!(from = %source.display(), to = relative, "copied artifact");
    Ok(())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), AssemblyError> {
    let io_err = |source| AssemblyError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, contents).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::*;
    use crate::pack::{verify_pack, VerifyOptions};
    use std::fs;

    const TS: &str = "2026-01-31T15:38:00Z";

    fn request(root: &Path) -> PackRequest {
        let primary = root.join("in/acme-20240630.htm");
        fs::create_dir_all(primary.parent().unwrap()).unwrap();
        fs::write(&primary, b"<html>10-K</html>").unwrap();
        let facts = vec![
            numeric_fact(US_GAAP, "Revenues", "c1", "1000000", Some("0")),
            numeric_fact(US_GAAP, "Revenues", "c1", "1500000", Some("0")),
        ];
        PackRequest {
            pack_id: "pack-acme".into(),
            out_dir: root.join("pack"),
            cik: "123456".into(),
            accession: "0000123456-24-000001".into(),
            form: "10-k".into(),
            filed_date: "2024-08-01".into(),
            primary_path: primary,
            primary_document_url: "https://www.sec.gov/Archives/edgar/data/123456/acme-20240630.htm".into(),
            model: model_with(facts, vec![context("c1", "2024-06-30")]),
            retrieved_at: Some(TS.into()),
            ..PackRequest::default()
        }
    }

    #[test]
    fn test_assemble_writes_verifiable_pack() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());
        let assembler = PackAssembler::from_config(EngineConfig::default()).unwrap();
        let summary = assembler.assemble(&req).unwrap();

        assert_eq!(summary.file_count, 3);
        assert!(summary.finding_count >= 1);
        let report = verify_pack(&summary.pack_dir, &VerifyOptions { validate_findings: true, ..Default::default() })
            .unwrap();
        assert!(report.passed(), "{:?}", report.issues);
        assert_eq!(report.warning_count(), 0);

        let findings: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(summary.pack_dir.join(FINDINGS_FILE)).unwrap()).unwrap();
        assert_eq!(findings["input"]["cik"], "0000123456");
        assert_eq!(findings["input"]["form"], "10-K");
        assert_eq!(findings["generated_at"], TS);
        assert_eq!(findings["ext"]["comparator_selection"]["selection_reason"], "no_history_provided");
        let patterns: Vec<&str> = findings["findings"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|f| f["pattern_id"].as_str())
            .collect();
        assert!(patterns.contains(&"XEW-P001"));
    }

    #[test]
    fn test_assembly_is_reproducible() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let assembler = PackAssembler::from_config(EngineConfig::default()).unwrap();
        let first = assembler.assemble(&request(a.path())).unwrap();
        let second = assembler.assemble(&request(b.path())).unwrap();
        assert_eq!(first.pack_sha256, second.pack_sha256);
    }

    #[test]
    fn test_refuses_non_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());
        fs::create_dir_all(&req.out_dir).unwrap();
        fs::write(req.out_dir.join("stale.txt"), b"x").unwrap();
        let assembler = PackAssembler::from_config(EngineConfig::default()).unwrap();
        assert!(matches!(assembler.assemble(&req), Err(AssemblyError::OutputNotEmpty { .. })));
    }

    #[test]
    fn test_rejects_invalid_identity() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = PackAssembler::from_config(EngineConfig::default()).unwrap();

        let mut req = request(dir.path());
        req.form = "S-1".into();
        assert!(matches!(assembler.assemble(&req), Err(AssemblyError::Selection(_))));

        let mut req = request(dir.path());
        req.cik = "12345678901".into();
        assert!(matches!(assembler.assemble(&req), Err(AssemblyError::Validation(_))));

        let mut req = request(dir.path());
        req.filed_date = "1985-01-01".into();
        assert!(matches!(assembler.assemble(&req), Err(AssemblyError::Validation(_))));
        assert!(!req.out_dir.exists());
    }

    #[test]
    fn test_history_primary_copied_and_comparator_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let prior_doc = dir.path().join("in/prior.htm");
        let mut req = request(dir.path());
        fs::write(&prior_doc, b"<html>prior</html>").unwrap();
        req.history = vec![HistoryFiling::new(
            HistoryEntry::new("0000123456-23-000010")
                .with_form("10-K")
                .with_primary_document_url("https://www.sec.gov/prior.htm"),
        )
        .with_primary_path(&prior_doc)
        .with_snapshot(FilingSnapshot::default())];

        let assembler = PackAssembler::from_config(EngineConfig::default()).unwrap();
        let summary = assembler.assemble(&req).unwrap();
        let rel = PackLayout::history_primary_relative("0000123456-23-000010");
        assert!(PackLayout::new(&summary.pack_dir).resolve(&rel).is_file());

        let findings: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(summary.pack_dir.join(FINDINGS_FILE)).unwrap()).unwrap();
        assert_eq!(findings["input"]["comparator"]["accession"], "0000123456-23-000010");
        assert_eq!(findings["input"]["comparator"]["primary_artifact_path"], rel.as_str());
        assert_eq!(
            findings["ext"]["comparator_selection"]["selection_reason"],
            "auto_selected_from_history"
        );
    }
}
