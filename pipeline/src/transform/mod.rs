//! Transformation module.
//!
//! - Normalize: bronze rows to silver rows (canonicalize, dedup, null drop)
//! - Pipeline: stage orchestration and the run manifest

pub mod normalize;
pub mod pipeline;

pub use normalize::{canonicalize, clean_table, parse_timestamp, CleanReport};
pub use pipeline::*;
