//! `pack_manifest.json`: every file in the pack with its digest and size.
//!
//! ## Pack Digest
//!
//! ```text
//! pack_sha256 = sha256( concat( sort_by_path( "{path}\t{sha256}\n" ) ) )
//! ```
//!
//! The manifest itself is never part of the digest. The digest depends only
//! on the set of `(path, sha256)` pairs, not the order they were added in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use super::layout::MANIFEST_FILE;
use super::{utc_now_iso, ManifestError};
use crate::canonical::to_canonical_json;
use crate::canonical_content::{sha256_file, sha256_hex};

/// What a file in the pack is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    /// Produced by this engine.
    XewOutput,
    /// Copied from EDGAR.
    EdgarArtifact,
    /// Toolchain record.
    Toolchain,
    /// Taxonomy package used as input.
    TaxonomyInput,
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::XewOutput => "xew_output",
            Self::EdgarArtifact => "edgar_artifact",
            Self::Toolchain => "toolchain",
            Self::TaxonomyInput => "taxonomy_input",
        };
        f.write_str(s)
    }
}

/// One file in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// POSIX path relative to the pack root.
    pub path: String,
    /// Lowercase hex SHA-256.
    pub sha256: String,
    /// Size in bytes.
    pub bytes: u64,
    /// File role.
    pub role: FileRole,
    /// Where the file was fetched from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// Parsed or built manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackManifest {
    /// Caller-chosen pack id.
    pub pack_id: String,
    /// UTC retrieval time, `YYYY-MM-DDTHH:MM:SSZ`.
    pub retrieved_at: String,
    /// Digest over every listed file.
    pub pack_sha256: String,
    /// Entries sorted by path.
    pub files: Vec<ManifestEntry>,
}

impl PackManifest {
    /// Canonical JSON text.
    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(to_canonical_json(self)?)
    }

    /// Write canonical JSON to `path`.
    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        let text = self.to_json()?;
        std::fs::write(path, text).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(pack_id = %self.pack_id, file_count = self.files.len(), path = %path.display(), "wrote pack manifest");
        Ok(())
    }
}

/// Digest over `(path, sha256)` pairs, skipping the manifest itself.
pub fn compute_pack_sha256<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut lines: Vec<String> = entries
        .into_iter()
        .filter(|(path, _)| *path != MANIFEST_FILE)
        .map(|(path, sha)| format!("{path}\t{sha}\n"))
        .collect();
    lines.sort();
    sha256_hex(lines.concat().as_bytes())
}

/// Collects files and produces a [`PackManifest`].
#[derive(Debug, Clone)]
pub struct PackManifestBuilder {
    pack_id: String,
    retrieved_at: Option<String>,
    files: Vec<ManifestEntry>,
}

impl PackManifestBuilder {
    /// Empty builder.
    pub fn new(pack_id: impl Into<String>) -> Self {
        Self {
            pack_id: pack_id.into(),
            retrieved_at: None,
            files: Vec::new(),
        }
    }

    /// Fix the retrieval timestamp. Defaults to now.
    pub fn retrieved_at(mut self, timestamp: impl Into<String>) -> Self {
        self.retrieved_at = Some(timestamp.into());
        self
    }

    /// Hash `abs_path` and record it at `path`.
    pub fn add_file(
        &mut self,
        path: &str,
        role: FileRole,
        abs_path: &Path,
        source_url: Option<String>,
    ) -> Result<&ManifestEntry, ManifestError> {
        if !abs_path.is_file() {
            return Err(ManifestError::FileNotFound {
                path: abs_path.to_path_buf(),
            });
        }
        let (sha256, bytes) = sha256_file(abs_path).map_err(|source| ManifestError::Io {
            path: abs_path.to_path_buf(),
            source,
        })?;
        debug!(path, %role, bytes, "added file to manifest");
        self.add_entry(ManifestEntry {
            path: path.to_string(),
            sha256,
            bytes,
            role,
            source_url,
        })
    }

    /// Record a pre-computed entry. Paths must be unique.
    pub fn add_entry(&mut self, entry: ManifestEntry) -> Result<&ManifestEntry, ManifestError> {
        if self.files.iter().any(|e| e.path == entry.path) {
            return Err(ManifestError::DuplicatePath { path: entry.path });
        }
        self.files.push(entry);
        Ok(&self.files[self.files.len() - 1])
    }

    /// Entries added so far, in insertion order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.files
    }

    /// Sort entries and compute the pack digest.
    pub fn build(self) -> PackManifest {
        let mut files = self.files;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let pack_sha256 = compute_pack_sha256(files.iter().map(|e| (e.path.as_str(), e.sha256.as_str())));
        let manifest = PackManifest {
            pack_id: self.pack_id,
            retrieved_at: self.retrieved_at.unwrap_or_else(utc_now_iso),
            pack_sha256,
            files,
        };
        info!(pack_id = %manifest.pack_id, file_count = manifest.files.len(), pack_sha256 = %manifest.pack_sha256, "built pack manifest");
        manifest
    }
}
