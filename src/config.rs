//! Engine configuration.
//!
//! Every tunable that can change output lives here, so a run is reproducible
//! from `(inputs, EngineConfig)`. The config's `params_hash` is recorded in
//! the pack's toolchain file.
//!
//! ## Float Normalization for Deterministic Hashing
//!
//! Marker thresholds are ratios. Floats are quantized (×1e6, rounded to i64)
//! before hashing so the hash does not depend on float formatting.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::canonical::to_canonical_json;
use crate::canonical_content::sha256_hex;
use crate::detectors::ConflictMode;
use crate::markers::MarkerThresholds;

/// Quantization factor for float normalization.
const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// Instances kept per finding in the findings document.
pub const DEFAULT_INSTANCE_LIMIT: usize = 100;

/// Examples kept per marker evidence list.
pub const DEFAULT_EXAMPLE_LIMIT: usize = 10;

/// Prior filings kept in the history window.
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

/// Environment variable overriding the P001 conflict mode.
pub const CONFLICT_MODE_ENV: &str = "XEW_P001_CONFLICT_MODE";

/// Configuration load failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// File is not valid config JSON.
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is out of range.
    #[error("Invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How P001 decides that duplicate values conflict.
    pub p001_conflict_mode: ConflictMode,
    /// Instances written per finding before truncation.
    pub instance_limit: usize,
    /// Examples written per marker list.
    pub example_limit: usize,
    /// Maximum history window size.
    pub history_window_max: usize,
    /// Marker thresholds.
    pub markers: MarkerThresholds,
    /// Rule-basis citation map to load into the registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_basis_map: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            p001_conflict_mode: ConflictMode::default(),
            instance_limit: DEFAULT_INSTANCE_LIMIT,
            example_limit: DEFAULT_EXAMPLE_LIMIT,
            history_window_max: DEFAULT_HISTORY_WINDOW,
            markers: MarkerThresholds::default(),
            rule_basis_map: None,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Apply `XEW_P001_CONFLICT_MODE` if set.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(raw) = std::env::var(CONFLICT_MODE_ENV) {
            self.p001_conflict_mode = raw.parse().map_err(|reason| ConfigError::Invalid {
                field: "p001_conflict_mode",
                reason,
            })?;
        }
        Ok(self)
    }

    /// Reject limits that would make output meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "instance_limit",
                reason: "must be at least 1".into(),
            });
        }
        if self.history_window_max == 0 {
            return Err(ConfigError::Invalid {
                field: "history_window_max",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Deterministic hash of every output-affecting parameter.
    ///
    /// The rule-basis map is identified by its own manifest entry, not its path.
    pub fn params_hash(&self) -> String {
        let mut hashed = self.clone();
        hashed.rule_basis_map = None;
        let value = serde_json::to_value(&hashed).map(quantize_floats).unwrap_or_default();
        let text = to_canonical_json(&value).unwrap_or_default();
        sha256_hex(text.as_bytes())
    }
}

fn quantize_floats(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Number(n) if n.is_f64() => {
            let q = n.as_f64().map_or(0, |f| (f * FLOAT_QUANTIZATION_FACTOR).round() as i64);
            Value::from(q)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(quantize_floats).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, quantize_floats(v)))
                .collect(),
        ),
        other => other,
    }
}
