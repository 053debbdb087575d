//! Pipeline configuration.
//!
//! Every input location, output directory and malformed-record policy is
//! carried by [`PipelineConfig`] and passed to the entry points explicitly.
//! Blob credentials are referenced by environment variable name so the
//! pre-authorized URL never has to live in the config file.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default HTTP timeout for blob reads
const DEFAULT_BLOB_TIMEOUT_SECS: u64 = 30;

/// What to do with a record that cannot be cleaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Stop the run with an error.
    #[default]
    Abort,
    /// Drop the offending row, count it and log a warning.
    DropRow,
}

/// Per-field malformed-record policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CleaningOptions {
    /// Unparseable `ordered_at` on orders.
    #[serde(default)]
    pub timestamp_policy: MalformedPolicy,
    /// Nested value that cannot be canonicalized.
    #[serde(default)]
    pub nested_value_policy: MalformedPolicy,
    /// Cleaned row violating the silver schema.
    #[serde(default)]
    pub schema_policy: MalformedPolicy,
}

/// Where a raw input lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceLocation {
    /// Local file.
    File { path: PathBuf },
    /// Pre-authorized blob URL, given inline or through an env var.
    Blob {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        url_env: Option<String>,
        #[serde(default = "default_blob_timeout")]
        timeout_secs: u64,
    },
}

fn default_blob_timeout() -> u64 {
    DEFAULT_BLOB_TIMEOUT_SECS
}

impl SourceLocation {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        SourceLocation::File { path: path.into() }
    }

    /// Resolve the blob URL, reading the env var when needed.
    pub fn blob_url(&self, source_name: &str) -> Result<Option<String>, ConfigError> {
        match self {
            SourceLocation::File { .. } => Ok(None),
            SourceLocation::Blob { url: Some(url), .. } => Ok(Some(url.clone())),
            SourceLocation::Blob { url_env: Some(var), .. } => env::var(var)
                .map(Some)
                .map_err(|_| ConfigError::MissingEnv(var.clone())),
            SourceLocation::Blob { .. } => Err(ConfigError::MissingUrl(source_name.to_string())),
        }
    }
}

/// Locations of every raw input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sources {
    pub customers: SourceLocation,
    pub orders: SourceLocation,
    #[serde(default)]
    pub products: Option<SourceLocation>,
    #[serde(default)]
    pub items: Option<SourceLocation>,
    pub tickets: SourceLocation,
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub sources: Sources,
    /// Directory for cleaned Parquet artifacts
    pub silver_dir: PathBuf,
    /// Directory for metric CSVs and the run manifest
    pub gold_dir: PathBuf,
    #[serde(default)]
    pub cleaning: CleaningOptions,
    /// Force a CSV delimiter instead of detecting it
    #[serde(default)]
    pub csv_delimiter: Option<char>,
}

impl PipelineConfig {
    /// Load a JSON config file. A `.env` file is loaded first so blob
    /// URL variables can come from it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Silver artifact path for an entity.
    pub fn silver_path(&self, entity: crate::models::Entity) -> PathBuf {
        self.silver_dir.join(entity.silver_file())
    }
}
