//! Content normalization and SHA-256 digests.
//!
//! ## Canonical Text
//!
//! ```text
//! normalize_text(text) = trim(normalize_newlines(text))
//! ```
//!
//! - `normalize_newlines`: CRLF → LF, CR → LF
//! - `trim`: remove leading and trailing whitespace
//!
//! Typed dimension members are digested in this form so that line-ending
//! differences between filing agents do not split otherwise identical contexts.
//!
//! ## File Digests
//!
//! Pack files are hashed by streaming, so large iXBRL documents never need to
//! be held in memory. [`HashValidation`] carries the outcome of comparing a
//! recorded digest against recomputed content.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const READ_CHUNK: usize = 64 * 1024;

/// Normalize newlines and trim.
pub fn normalize_text(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    normalized.trim().to_string()
}

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Stream a file through SHA-256, returning the hex digest and byte count.
pub fn sha256_file(path: &Path) -> io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), total))
}

/// Whether a string is a 64-character hex digest (either case).
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Digest validation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashValidation {
    /// Recorded digest matches the content.
    Valid,
    /// Recorded digest does not match the content.
    Mismatch {
        /// The digest that was recorded.
        expected: String,
        /// The digest computed from the current content.
        computed: String,
    },
    /// No digest was recorded.
    Missing,
}

impl HashValidation {
    /// Compare a recorded digest with a computed one, case-insensitively.
    pub fn compare(recorded: Option<&str>, computed: &str) -> Self {
        match recorded.map(str::trim).filter(|r| !r.is_empty()) {
            None => Self::Missing,
            Some(expected) if expected.eq_ignore_ascii_case(computed) => Self::Valid,
            Some(expected) => Self::Mismatch {
                expected: expected.to_string(),
                computed: computed.to_string(),
            },
        }
    }

    /// Whether the digest matched.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}
