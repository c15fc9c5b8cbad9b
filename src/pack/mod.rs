//! Evidence Pack assembly and verification.
//!
//! A pack is a directory whose every file is listed, hashed and sized in
//! `pack_manifest.json`. Assembly writes the pack exactly once; verification
//! only reads it.

pub mod assembler;
pub mod layout;
pub mod manifest;
pub mod verify;

pub use assembler::{AssemblyError, HistoryFiling, PackAssembler, PackRequest, PackSummary};
pub use layout::{role_for_path, to_posix, PackLayout};
pub use manifest::{compute_pack_sha256, FileRole, ManifestEntry, PackManifest, PackManifestBuilder};
pub use verify::{
    verify_pack, IssueKind, Severity, VerificationOutcome, VerificationReport, VerifyError, VerifyIssue,
    VerifyMode, VerifyOptions,
};

use std::path::PathBuf;

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn utc_now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Manifest construction failure.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// A file to be listed does not exist.
    #[error("File not found: {}", path.display())]
    FileNotFound {
        /// Missing file.
        path: PathBuf,
    },
    /// Two entries share a path.
    #[error("Duplicate manifest path: {path}")]
    DuplicatePath {
        /// Repeated path.
        path: String,
    },
    /// Path is absolute, empty, or escapes the pack root.
    #[error("Invalid pack-relative path: {path}")]
    InvalidPath {
        /// Rejected path.
        path: String,
    },
    /// Reading or writing failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Serialization failed.
    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}
