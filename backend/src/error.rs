//! Error types for the reshape pipeline.
//!
//! One error enum per layer:
//!
//! - [`SchemaError`] - configuration defects in the caller's schema
//! - [`SourceError`] - the input file could not be read or split into rows
//! - [`ExportError`] - the reshaped output could not be produced or written
//! - [`PipelineError`] - top-level orchestration errors
//! - [`ServerError`] - HTTP adapter errors
//!
//! Per-field validation failures are *not* errors in this sense: they are
//! collected as diagnostics and only surface as a failed
//! [`RunOutcome`](crate::pipeline::RunOutcome) at the end of a run.

use thiserror::Error;

// =============================================================================
// Schema (configuration) Errors
// =============================================================================

/// Defects in the schema supplied by the caller.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The schema document is not valid JSON or has the wrong shape.
    #[error("Malformed schema: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A column key is not a zero-based integer.
    #[error("Invalid column key '{0}': expected a zero-based column index")]
    InvalidColumnKey(String),

    /// Two keys resolve to the same column (e.g. `"1"` and `"01"`).
    #[error("Column {0} is defined more than once")]
    DuplicateColumn(usize),

    /// Two columns would be exported under the same header.
    #[error("Target '{target}' is used by both column {first} and column {second}")]
    DuplicateTarget {
        target: String,
        first: usize,
        second: usize,
    },

    /// A rule of type `equals` lists no allowed values.
    #[error("Column {column}: type 'equals' requires a non-empty 'equalValues' list")]
    MissingExpectedValues { column: usize },

    /// Failed to read the schema file.
    #[error("Failed to read schema: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Source Errors
// =============================================================================

/// Errors while loading the delimited source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to open or read the file.
    #[error("Failed to read source '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The source has no lines at all.
    #[error("Source file is empty")]
    EmptyFile,

    /// Only single-byte (ASCII) delimiters can be used to split rows.
    #[error("Unsupported delimiter '{0}': must be a single ASCII character")]
    UnsupportedDelimiter(char),

    /// The row splitter rejected the content.
    #[error("Invalid delimited content: {0}")]
    Parse(#[from] csv::Error),
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while producing the reshaped output.
#[derive(Debug, Error)]
pub enum ExportError {
    /// There is nothing to export (not even a header row).
    #[error("No data available to export")]
    NoData,

    /// Only single-byte (ASCII) delimiters can be written.
    #[error("Unsupported output delimiter '{0}': must be a single ASCII character")]
    UnsupportedDelimiter(char),

    /// The destination could not be written.
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The delimited writer failed.
    #[error("CSV writer error: {0}")]
    Csv(#[from] csv::Error),

    /// The writer produced bytes that are not UTF-8.
    #[error("Output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level errors returned by [`crate::pipeline::Pipeline::run`] and the
/// convenience entry points.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Schema defect, reported before any row is processed.
    #[error("Configuration error: {0}")]
    Schema(#[from] SchemaError),

    /// Source could not be loaded.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Output could not be produced.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// A row worker panicked or was cancelled.
    #[error("Row worker for line {line} failed: {message}")]
    Worker { line: usize, message: String },
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Failed to bind or serve.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for schema loading.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for source loading.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
