//! Independent, read-only pack verification.
//!
//! The verifier trusts nothing but `pack_manifest.json`: every listed file is
//! re-hashed and re-sized, the pack digest is recomputed from the listed
//! pairs, and files on disk that the manifest does not know about are
//! reported. Problems with individual entries are issues in the report; only
//! a pack without a usable manifest is a hard error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::layout::{to_posix, PackLayout, FINDINGS_FILE, MANIFEST_FILE};
use super::manifest::compute_pack_sha256;
use crate::canonical_content::{is_sha256_hex, sha256_file, HashValidation};
use crate::findings::{FINDINGS_SCHEMA_ID, FINDINGS_SCHEMA_VERSION};

/// How deep to check file contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    /// Presence, size and digest.
    #[default]
    Full,
    /// Presence and size only.
    StructureOnly,
}

/// Verifier switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Content depth.
    pub mode: VerifyMode,
    /// Also check the findings document's shape.
    pub validate_findings: bool,
    /// Stop at the first error.
    pub fail_fast: bool,
}

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Fails verification.
    Error,
    /// Reported only.
    Warning,
}

/// What is wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    /// Entry lacks a usable path, digest or size.
    BadEntry {
        /// What is missing or malformed.
        reason: String,
    },
    /// Listed file is absent.
    MissingFile,
    /// Listed file could not be read.
    Unreadable {
        /// I/O error text.
        reason: String,
    },
    /// Size differs from the manifest.
    SizeMismatch {
        /// Recorded size.
        expected: u64,
        /// Size on disk.
        actual: u64,
    },
    /// Digest differs from the manifest.
    DigestMismatch {
        /// Recorded digest.
        expected: String,
        /// Digest on disk.
        actual: String,
    },
    /// Recomputed pack digest differs from the manifest.
    PackDigestMismatch {
        /// Recorded digest.
        expected: String,
        /// Recomputed digest.
        actual: String,
    },
    /// File on disk that the manifest does not list.
    UnlistedFile,
    /// Findings document missing or malformed.
    FindingsInvalid {
        /// What is wrong with it.
        reason: String,
    },
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyIssue {
    /// Severity.
    pub severity: Severity,
    /// Pack-relative path, when the issue concerns one file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Issue detail.
    #[serde(flatten)]
    pub kind: IssueKind,
}

impl VerifyIssue {
    fn error(path: Option<&str>, kind: IssueKind) -> Self {
        Self {
            severity: Severity::Error,
            path: path.map(str::to_string),
            kind,
        }
    }

    fn warning(path: Option<&str>, kind: IssueKind) -> Self {
        Self {
            severity: Severity::Warning,
            path: path.map(str::to_string),
            kind,
        }
    }
}

/// Pass/fail summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// No errors.
    pub passed: bool,
    /// Error count.
    pub error_count: usize,
    /// Warning count.
    pub warning_count: usize,
    /// Listed entries examined.
    pub files_checked: usize,
}

/// Full verification result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Pack id from the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_id: Option<String>,
    /// Issues in discovery order.
    pub issues: Vec<VerifyIssue>,
    /// Listed entries examined.
    pub files_checked: usize,
}

impl VerificationReport {
    /// Number of errors.
    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Error).count()
    }

    /// Number of warnings.
    pub fn warning_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Warning).count()
    }

    /// True when no errors were found.
    pub fn passed(&self) -> bool {
        self.error_count() == 0
    }

    /// Summary counts.
    pub fn outcome(&self) -> VerificationOutcome {
        VerificationOutcome {
            passed: self.passed(),
            error_count: self.error_count(),
            warning_count: self.warning_count(),
            files_checked: self.files_checked,
        }
    }

    /// Process exit code: 0 pass, 2 fail.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            2
        }
    }

    // Returns true when verification should stop.
    fn push(&mut self, issue: VerifyIssue, fail_fast: bool) -> bool {
        match issue.severity {
            Severity::Error => debug!(path = ?issue.path, kind = ?issue.kind, "verification error"),
            Severity::Warning => warn!(path = ?issue.path, kind = ?issue.kind, "verification warning"),
        }
        let stop = fail_fast && issue.severity == Severity::Error;
        self.issues.push(issue);
        stop
    }
}

/// Pack cannot be verified at all.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Pack directory does not exist.
    #[error("Pack directory not found: {}", path.display())]
    MissingPackDir {
        /// Requested directory.
        path: PathBuf,
    },
    /// No manifest in the pack.
    #[error("Manifest not found: {}", path.display())]
    MissingManifest {
        /// Expected manifest path.
        path: PathBuf,
    },
    /// Manifest exists but cannot be read.
    #[error("Failed to read manifest {}: {source}", path.display())]
    ManifestUnreadable {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Manifest is not a JSON object.
    #[error("Malformed manifest {}: {reason}", path.display())]
    ManifestMalformed {
        /// Manifest path.
        path: PathBuf,
        /// Parse failure.
        reason: String,
    },
    /// Manifest lacks `pack_sha256`.
    #[error("Manifest missing pack_sha256")]
    MissingPackSha,
    /// Manifest lacks a `files` array.
    #[error("Manifest missing files list")]
    MissingFiles,
}

struct ListedFile<'a> {
    path: String,
    sha256: &'a str,
    bytes: u64,
}

fn parse_entry(value: &Value) -> Result<ListedFile<'_>, String> {
    let path = value
        .get("path")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .ok_or("missing path")?;
    let path = to_posix(Path::new(path))
        .ok()
        .filter(|normalized| normalized == path)
        .ok_or_else(|| format!("path is not a pack-relative POSIX path: {path}"))?;
    let sha256 = value
        .get("sha256")
        .and_then(Value::as_str)
        .filter(|s| is_sha256_hex(s))
        .ok_or("missing or malformed sha256")?;
    let bytes = value.get("bytes").and_then(Value::as_u64).ok_or("missing bytes")?;
    Ok(ListedFile { path, sha256, bytes })
}

/// Verify the pack in `dir`.
pub fn verify_pack(dir: &Path, options: &VerifyOptions) -> Result<VerificationReport, VerifyError> {
    if !dir.is_dir() {
        error!(path = %dir.display(), "pack directory not found");
        return Err(VerifyError::MissingPackDir { path: dir.to_path_buf() });
    }
    let layout = PackLayout::new(dir);
    let manifest_path = layout.manifest_path();
    if !manifest_path.is_file() {
        error!(path = %manifest_path.display(), "manifest not found");
        return Err(VerifyError::MissingManifest { path: manifest_path });
    }
    let text = std::fs::read_to_string(&manifest_path).map_err(|source| VerifyError::ManifestUnreadable {
        path: manifest_path.clone(),
        source,
    })?;
    let manifest: Value = serde_json::from_str(&text).map_err(|e| VerifyError::ManifestMalformed {
        path: manifest_path.clone(),
        reason: e.to_string(),
    })?;
    if !manifest.is_object() {
        return Err(VerifyError::ManifestMalformed {
            path: manifest_path,
            reason: "top level is not an object".into(),
        });
    }
    let recorded_pack_sha = manifest
        .get("pack_sha256")
        .and_then(Value::as_str)
        .ok_or(VerifyError::MissingPackSha)?;
    let files = manifest
        .get("files")
        .and_then(Value::as_array)
        .ok_or(VerifyError::MissingFiles)?;

    let mut report = VerificationReport {
        pack_id: manifest.get("pack_id").and_then(Value::as_str).map(str::to_string),
        ..VerificationReport::default()
    };
    let fail_fast = options.fail_fast;
    let mut listed: BTreeSet<String> = BTreeSet::new();
    let mut pairs: Vec<(String, String)> = Vec::with_capacity(files.len());

    for (index, value) in files.iter().enumerate() {
        report.files_checked += 1;
        let entry = match parse_entry(value) {
            Ok(entry) => entry,
            Err(reason) => {
                let raw_path = value.get("path").and_then(Value::as_str);
                let reason = format!("files[{index}]: {reason}");
                if report.push(VerifyIssue::error(raw_path, IssueKind::BadEntry { reason }), fail_fast) {
                    return Ok(report);
                }
                continue;
            }
        };
        listed.insert(entry.path.clone());
        pairs.push((entry.path.clone(), entry.sha256.to_string()));

        let absolute = layout.resolve(&entry.path);
        if !absolute.is_file() {
            if report.push(VerifyIssue::error(Some(&entry.path), IssueKind::MissingFile), fail_fast) {
                return Ok(report);
            }
            continue;
        }

        let issue = match options.mode {
            VerifyMode::StructureOnly => match std::fs::metadata(&absolute) {
                Ok(meta) if meta.len() != entry.bytes => Some(IssueKind::SizeMismatch {
                    expected: entry.bytes,
                    actual: meta.len(),
                }),
                Ok(_) => None,
                Err(e) => Some(IssueKind::Unreadable { reason: e.to_string() }),
            },
            VerifyMode::Full => match sha256_file(&absolute) {
                Ok((_, actual)) if actual != entry.bytes => Some(IssueKind::SizeMismatch {
                    expected: entry.bytes,
                    actual,
                }),
                Ok((digest, _)) => match HashValidation::compare(Some(entry.sha256), &digest) {
                    HashValidation::Mismatch { expected, computed } => Some(IssueKind::DigestMismatch {
                        expected,
                        actual: computed,
                    }),
                    HashValidation::Valid | HashValidation::Missing => None,
                },
                Err(e) => Some(IssueKind::Unreadable { reason: e.to_string() }),
            },
        };
        if let Some(kind) = issue {
            if report.push(VerifyIssue::error(Some(&entry.path), kind), fail_fast) {
                return Ok(report);
            }
        }
    }

    let recomputed = compute_pack_sha256(pairs.iter().map(|(p, s)| (p.as_str(), s.as_str())));
    if !recomputed.eq_ignore_ascii_case(recorded_pack_sha) {
        let kind = IssueKind::PackDigestMismatch {
            expected: recorded_pack_sha.to_string(),
            actual: recomputed,
        };
        if report.push(VerifyIssue::error(None, kind), fail_fast) {
            return Ok(report);
        }
    }

    for entry in WalkDir::new(dir).sort_by_file_name().into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let Ok(relative) = to_posix(relative) else {
            continue;
        };
        if relative != MANIFEST_FILE && !listed.contains(&relative) {
            report.push(VerifyIssue::warning(Some(&relative), IssueKind::UnlistedFile), fail_fast);
        }
    }

    if options.validate_findings {
        if let Err(reason) = check_findings(&layout.findings_path()) {
            report.push(
                VerifyIssue::error(Some(FINDINGS_FILE), IssueKind::FindingsInvalid { reason }),
                fail_fast,
            );
        }
    }

    let outcome = report.outcome();
    info!(
        pack_dir = %dir.display(),
        passed = outcome.passed,
        files_checked = outcome.files_checked,
        errors = outcome.error_count,
        warnings = outcome.warning_count,
        "pack verification complete"
    );
    Ok(report)
}

fn check_findings(path: &Path) -> Result<(), String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("unreadable: {e}"))?;
    let doc: Value = serde_json::from_str(&text).map_err(|e| format!("not JSON: {e}"))?;
    let schema_id = doc.get("schema_id").and_then(Value::as_str);
    if schema_id != Some(FINDINGS_SCHEMA_ID) {
        return Err(format!("unexpected schema_id {schema_id:?}"));
    }
    let version = doc.get("schema_version").and_then(Value::as_str);
    if version != Some(FINDINGS_SCHEMA_VERSION) {
        return Err(format!("unexpected schema_version {version:?}"));
    }
    if !doc.get("findings").is_some_and(Value::is_array) {
        return Err("findings is not an array".into());
    }
    Ok(())
}
