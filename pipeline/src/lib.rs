//! # Restaurant Pipeline - batch cleaning and reporting for restaurant data
//!
//! Raw restaurant extracts (customers, orders, products, order items as CSV;
//! support tickets as newline-delimited JSON) are cleaned into columnar
//! silver artifacts, then summarized into gold CSV metric tables.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ CSV / NDJSON│────▶│   Source    │────▶│  Normalize  │────▶│   Parquet   │
//! │ (file/blob) │     │  + Parser   │     │  (silver)   │     │  cleaned_*  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    │
//!                     ┌─────────────┐     ┌─────────────┐            │
//!                     │  Gold CSVs  │◀────│   Report    │◀───────────┘
//!                     │ + manifest  │     │  (metrics)  │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use restaurant_pipeline::{run, PipelineConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PipelineConfig::load(Path::new("pipeline.json")).unwrap();
//!     let manifest = run(&config).await.unwrap();
//!     println!("{} tables cleaned", manifest.cleaning.len());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Cell values, tables and typed views
//! - [`config`] - Run configuration and malformed-data policies
//! - [`logs`] - Progress log broadcaster
//! - [`parser`] - CSV and NDJSON parsing with auto-detection
//! - [`source`] - Local file and blob storage reads
//! - [`transform`] - Record normalization and stage orchestration
//! - [`validation`] - Silver schema contracts
//! - [`artifact`] - Parquet, CSV and JSON artifact IO
//! - [`report`] - Business metrics

// Core modules
pub mod error;
pub mod models;
pub mod config;
pub mod logs;

// Loading
pub mod parser;
pub mod source;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Artifacts and metrics
pub mod artifact;
pub mod report;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ArtifactError,
    CleanError,
    ConfigError,
    PipelineError,
    PipelineResult,
    ReportError,
    SourceError,
};

// =============================================================================
// Re-exports - Models and config
// =============================================================================

pub use models::{CleanTable, Entity, Order, RawTable, RawValue, Scalar, SupportTicket};

pub use config::{CleaningOptions, MalformedPolicy, PipelineConfig, SourceLocation, Sources};

// =============================================================================
// Re-exports - Parsing and loading
// =============================================================================

pub use parser::{
    decode_content,
    detect_delimiter,
    detect_encoding,
    parse_csv_bytes,
    parse_csv_str,
    parse_ndjson,
    ParseError,
    ParseResult,
};

pub use source::{load_source, SourceFormat};

// =============================================================================
// Re-exports - Cleaning
// =============================================================================

pub use transform::normalize::{canonicalize, clean_table, parse_timestamp, CleanReport};

pub use validation::SilverValidator;

// =============================================================================
// Re-exports - Reporting
// =============================================================================

pub use report::{
    average_order_value,
    tickets_per_order,
    total_revenue,
    AverageOrderValue,
    MetricValue,
    TicketsPerOrder,
    TotalRevenue,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{run, run_cleaning, run_reporting, ReportOutcome, RunManifest};
