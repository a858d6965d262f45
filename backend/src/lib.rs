//! # Reshape - schema-driven CSV reshaping and validation
//!
//! Reshape reads a delimited file, rewrites selected columns through a chain
//! of transformations, validates every rewritten value, and either exports the
//! reshaped table (with renamed headers) or reports every failure by column
//! and line.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV File   │────▶│   Parser    │────▶│  Transform  │────▶│  Reshaped   │
//! │  (ISO/UTF8) │     │ (auto-delim)│     │ + Validate  │     │ CSV/report  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reshape::{validate_file, PipelineOptions, RunOutcome, Schema};
//!
//! #[tokio::main]
//! async fn main() {
//!     let schema = Schema::from_file("schema.json").unwrap();
//!     match validate_file("input.csv", schema, PipelineOptions::default()).await.unwrap() {
//!         RunOutcome::Succeeded(table) => println!("{} rows", table.data_rows().len()),
//!         RunOutcome::Failed(report) => eprintln!("{}", report),
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Layered error types
//! - [`config`] - Environment settings
//! - [`schema`] - Column rules
//! - [`parser`] - Source decoding, delimiter detection, row splitting
//! - [`transform`] - Transformations, report, pipeline
//! - [`validation`] - Field checks
//! - [`export`] - Header relabelling, delimited/JSON output
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod schema;

// Parsing
pub mod parser;

// Transformation
pub mod transform;
pub use transform::pipeline;

// Validation
pub mod validation;

// Output
pub mod export;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Errors and settings
// =============================================================================

pub use config::{ConfigError, Settings};
pub use error::{
    ExportError, PipelineError, PipelineResult, SchemaError, ServerError, SourceError,
};

// =============================================================================
// Re-exports - Schema
// =============================================================================

pub use schema::{example_schema, FieldRule, Schema, ValueType};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{decode_content, detect_delimiter, detect_encoding, split_rows, Source, SourceRow};

// =============================================================================
// Re-exports - Transformation and validation
// =============================================================================

pub use transform::report::{Diagnostic, ErrorReport};
pub use transform::{apply_chain, operations_description, transform_row, Transformation};
pub use validation::{Validator, Violation, ViolationKind};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    validate_file, Pipeline, PipelineOptions, RunOutcome, RunState, TransformedTable,
};

// =============================================================================
// Re-exports - Export
// =============================================================================

pub use export::{
    relabel_header, to_delimited, to_delimited_preview, to_json_preview, write_transformed,
    PreviewFormat,
};

// Server
pub mod server {
    pub use crate::api::server::{build_router, start_server};
}
