//! Fixed Evidence Pack layout.
//!
//! ```text
//! <pack>/
//!   pack_manifest.json
//!   xew_findings.json
//!   toolchain/toolchain.json
//!   artifacts/primary.html
//!   artifacts/<additional artifacts>
//!   artifacts/history/<accession>/primary.html
//! ```
//!
//! Every path recorded anywhere in a pack is a POSIX path relative to the
//! pack root.

use std::path::{Component, Path, PathBuf};

use super::manifest::FileRole;
use super::ManifestError;

/// Manifest file name.
pub const MANIFEST_FILE: &str = "pack_manifest.json";
/// Findings document file name.
pub const FINDINGS_FILE: &str = "xew_findings.json";
/// Toolchain record, relative to the pack root.
pub const TOOLCHAIN_FILE: &str = "toolchain/toolchain.json";
/// Artifact directory.
pub const ARTIFACTS_DIR: &str = "artifacts";
/// Primary document name inside the artifact directories.
pub const PRIMARY_FILE: &str = "primary.html";

/// Convert a relative path to its POSIX form.
///
/// Absolute paths and paths that escape the root are rejected.
pub fn to_posix(path: &Path) -> Result<String, ManifestError> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ManifestError::InvalidPath {
                    path: path.display().to_string(),
                });
            }
        }
    }
    if parts.is_empty() {
        return Err(ManifestError::InvalidPath {
            path: path.display().to_string(),
        });
    }
    Ok(parts.join("/"))
}

/// Role implied by a pack-relative path.
pub fn role_for_path(path: &str) -> FileRole {
    if path == FINDINGS_FILE {
        FileRole::XewOutput
    } else if path.starts_with("toolchain/") {
        FileRole::Toolchain
    } else if path.starts_with("taxonomy/") {
        FileRole::TaxonomyInput
    } else {
        FileRole::EdgarArtifact
    }
}

/// Paths inside one pack directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackLayout {
    root: PathBuf,
}

impl PackLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Pack root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a pack-relative POSIX path.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        relative.split('/').fold(self.root.clone(), |acc, part| acc.join(part))
    }

    /// `pack_manifest.json`.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// `xew_findings.json`.
    pub fn findings_path(&self) -> PathBuf {
        self.root.join(FINDINGS_FILE)
    }

    /// `toolchain/toolchain.json`.
    pub fn toolchain_path(&self) -> PathBuf {
        self.resolve(TOOLCHAIN_FILE)
    }

    /// Relative path of the primary document.
    pub fn primary_relative() -> String {
        format!("{ARTIFACTS_DIR}/{PRIMARY_FILE}")
    }

    /// Relative path of an additional artifact.
    pub fn artifact_relative(name: &Path) -> Result<String, ManifestError> {
        Ok(format!("{ARTIFACTS_DIR}/{}", to_posix(name)?))
    }

    /// Relative path of a history filing's primary document.
    pub fn history_primary_relative(accession: &str) -> String {
        format!("{ARTIFACTS_DIR}/history/{accession}/{PRIMARY_FILE}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_posix() {
        assert_eq!(to_posix(Path::new("artifacts/./a/b.htm")).unwrap(), "artifacts/a/b.htm");
        assert!(to_posix(Path::new("../escape")).is_err());
        assert!(to_posix(Path::new("/etc/passwd")).is_err());
        assert!(to_posix(Path::new("")).is_err());
    }

    #[test]
    fn test_roles() {
        assert_eq!(role_for_path("xew_findings.json"), FileRole::XewOutput);
        assert_eq!(role_for_path("toolchain/toolchain.json"), FileRole::Toolchain);
        assert_eq!(role_for_path("taxonomy/us-gaap-2024.zip"), FileRole::TaxonomyInput);
        assert_eq!(role_for_path("artifacts/primary.html"), FileRole::EdgarArtifact);
    }

    #[test]
    fn test_layout_paths() {
        let layout = PackLayout::new("/tmp/pack");
        assert_eq!(layout.toolchain_path(), Path::new("/tmp/pack/toolchain/toolchain.json"));
        assert_eq!(
            PackLayout::history_primary_relative("0000123456-23-000001"),
            "artifacts/history/0000123456-23-000001/primary.html"
        );
        assert_eq!(
            PackLayout::artifact_relative(Path::new("R1.htm")).unwrap(),
            "artifacts/R1.htm"
        );
    }
}
