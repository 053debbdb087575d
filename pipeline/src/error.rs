//! Error types for the restaurant pipeline.
//!
//! One error type per stage, wrapped by [`PipelineError`]:
//!
//! - [`ConfigError`] - configuration loading
//! - [`SourceError`] - reading raw inputs (files, blob store)
//! - [`CleanError`] - malformed records under an `abort` policy
//! - [`ArtifactError`] - reading/writing silver and gold artifacts
//! - [`ReportError`] - building typed views for aggregation
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Cannot read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`crate::config::PipelineConfig`].
    #[error("Invalid config: {0}")]
    Invalid(#[from] serde_json::Error),

    /// A blob source names an environment variable that is not set.
    #[error("Environment variable {0} is not set")]
    MissingEnv(String),

    /// A blob source has neither `url` nor `url_env`.
    #[error("Source '{0}' needs either 'url' or 'url_env'")]
    MissingUrl(String),
}

// =============================================================================
// Source Errors
// =============================================================================

/// Errors reading a raw input. Always fatal.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Local file missing or unreadable.
    #[error("Cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed delimited file.
    #[error("Invalid CSV in '{path}': {message}")]
    Csv { path: String, message: String },

    /// A newline-delimited JSON line that is not a JSON object.
    #[error("Invalid JSON on line {line} of '{path}': {message}")]
    Ndjson {
        path: String,
        line: usize,
        message: String,
    },

    /// Blob endpoint refused the pre-authorized URL.
    #[error("Blob store denied access to {url} (HTTP {status})")]
    Unauthorized { url: String, status: u16 },

    /// Blob endpoint unreachable or returned a non-success status.
    #[error("Blob store unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },
}

// =============================================================================
// Cleaning Errors
// =============================================================================

/// Malformed records hit while cleaning under an `abort` policy.
#[derive(Debug, Error)]
pub enum CleanError {
    /// `ordered_at` could not be parsed.
    #[error("{entity} row {row}: cannot parse timestamp '{value}' in column '{column}'")]
    MalformedTimestamp {
        entity: String,
        row: usize,
        column: String,
        value: String,
    },

    /// A list/mapping value could not be canonicalized.
    #[error("{entity} row {row}: cannot serialize nested value in column '{column}': {message}")]
    MalformedNested {
        entity: String,
        row: usize,
        column: String,
        message: String,
    },

    /// A cleaned row violates the silver contract.
    #[error("{entity} row {row} violates the silver schema: {}", errors.join("; "))]
    SchemaViolation {
        entity: String,
        row: usize,
        errors: Vec<String>,
    },
}

// =============================================================================
// Artifact Errors
// =============================================================================

/// Errors reading or writing pipeline artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact IO error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Column type the silver reader does not understand.
    #[error("Unsupported column type for '{column}': {data_type}")]
    UnsupportedColumn { column: String, data_type: String },
}

// =============================================================================
// Report Errors
// =============================================================================

/// Errors turning silver tables into typed views.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Required column absent from a silver table.
    #[error("{entity} is missing column '{column}'")]
    MissingColumn { entity: String, column: String },

    /// Cell of the wrong type in a silver table.
    #[error("{entity} row {row}: column '{column}' expected {expected}")]
    WrongType {
        entity: String,
        row: usize,
        column: String,
        expected: &'static str,
    },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Cleaning error: {0}")]
    Clean(#[from] CleanError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for source loading.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for cleaning operations.
pub type CleanResult<T> = Result<T, CleanError>;

/// Result type for artifact IO.
pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let clean_err = CleanError::MalformedTimestamp {
            entity: "orders".into(),
            row: 3,
            column: "ordered_at".into(),
            value: "yesterday".into(),
        };
        let pipeline_err: PipelineError = clean_err.into();
        let msg = pipeline_err.to_string();
        assert!(msg.contains("yesterday"));
        assert!(msg.contains("row 3"));

        let source_err = SourceError::Unauthorized {
            url: "https://blob.example/tickets.jsonl".into(),
            status: 403,
        };
        let pipeline_err: PipelineError = source_err.into();
        assert!(pipeline_err.to_string().contains("403"));
    }

    #[test]
    fn test_schema_violation_format() {
        let err = CleanError::SchemaViolation {
            entity: "orders".into(),
            row: 0,
            errors: vec!["subtotal is not a number".into(), "order_id missing".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("subtotal is not a number; order_id missing"));
    }
}
