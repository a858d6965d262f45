//! Row pipeline orchestrator.
//!
//! A run moves through
//! `Idle → DetectingDelimiter → ProcessingRows → Succeeded | Failed`:
//!
//! 1. The delimiter is detected once from the leading lines (unless forced).
//! 2. The header row is set aside; it is never transformed or validated.
//! 3. Every data row becomes one unit of work (transform, then validate) on
//!    its own tokio task, with at most `workers` in flight.
//! 4. All workers are awaited. Their error batches are merged by this task
//!    alone; workers share nothing mutable.
//! 5. No diagnostics: the transformed rows (header first, input order) are
//!    returned. Any diagnostic: only the error report is returned.
//!
//! # Example
//!
//! ```rust,ignore
//! use reshape::{Pipeline, RunOutcome, Schema, Source, Validator};
//!
//! let schema = Schema::from_json(r#"{"1": {"type": "int", "target": "age"}}"#)?;
//! let source = Source::from_path("people.csv")?;
//!
//! match Pipeline::new(schema, Validator::new()).run(&source).await? {
//!     RunOutcome::Succeeded(table) => println!("{} rows", table.data_rows().len()),
//!     RunOutcome::Failed(report) => eprintln!("{}", report),
//! }
//! ```

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::report::{Diagnostic, ErrorLog, ErrorReport};
use super::transform_row;
use crate::api::logs::RunLogger;
use crate::error::{PipelineError, PipelineResult, SourceError};
use crate::parser::{detect_delimiter, Source, SourceRow};
use crate::schema::Schema;
use crate::validation::{Validator, Violation};

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    DetectingDelimiter,
    ProcessingRows,
    Succeeded,
    Failed,
}

impl RunState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Idle, RunState::DetectingDelimiter)
                | (RunState::DetectingDelimiter, RunState::ProcessingRows)
                | (RunState::ProcessingRows, RunState::Succeeded)
                | (RunState::ProcessingRows, RunState::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

/// Tuning knobs for a run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Maximum number of row workers in flight
    pub workers: usize,
    /// Skip detection and split with this delimiter
    pub delimiter: Option<char>,
    /// Id attached to progress entries; `None` gives every run a fresh id
    pub run_id: Option<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            delimiter: None,
            run_id: None,
        }
    }
}

/// Available parallelism, or 4 when it cannot be queried.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// The reshaped dataset of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformedTable {
    /// Header at index 0, then data rows in source order
    pub rows: Vec<Vec<String>>,
    /// Delimiter the source was split with
    pub delimiter: char,
    /// Encoding the source was decoded with
    pub encoding: String,
}

impl TransformedTable {
    pub fn header(&self) -> &[String] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn data_rows(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or(&[])
    }
}

/// Result of a run that got as far as processing rows.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Succeeded(TransformedTable),
    Failed(ErrorReport),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded(_))
    }

    pub fn state(&self) -> RunState {
        match self {
            RunOutcome::Succeeded(_) => RunState::Succeeded,
            RunOutcome::Failed(_) => RunState::Failed,
        }
    }
}

/// Transforms and validates a source against a schema.
///
/// The schema and validator are shared read-only by every row worker of
/// every run; a `Pipeline` can be reused for any number of concurrent runs.
#[derive(Debug, Clone)]
pub struct Pipeline {
    schema: Arc<Schema>,
    validator: Arc<Validator>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(schema: Schema, validator: Validator) -> Self {
        Self {
            schema: Arc::new(schema),
            validator: Arc::new(validator),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run every data row through transform-then-validate.
    ///
    /// `Err` is reserved for fatal problems (unsplittable source, a crashed
    /// worker). Validation failures come back as [`RunOutcome::Failed`].
    pub async fn run(&self, source: &Source) -> PipelineResult<RunOutcome> {
        let started = Instant::now();
        let progress = RunLogger::new(
            self.options
                .run_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        );
        let mut run = RunTracker::default();

        run.advance(RunState::DetectingDelimiter);
        let delimiter = match self.options.delimiter {
            Some(d) => d,
            None => detect_delimiter(&source.sample_lines()),
        };
        progress.success(format!("Detected separator: '{}'", format_delimiter(delimiter)));

        let mut rows = source.rows(delimiter)?.into_iter();
        run.advance(RunState::ProcessingRows);
        let header = rows.next().ok_or(SourceError::EmptyFile)?;
        if let Some((last, _)) = self.schema.iter().last() {
            if last >= header.cells.len() {
                progress.warning(format!(
                    "Schema references column {} but the header has {} column(s)",
                    last + 1,
                    header.cells.len()
                ));
            }
        }
        let data: Vec<SourceRow> = rows.collect();
        let total = data.len();
        progress.info(format!(
            "Processing {} rows against {} column rule(s)",
            total,
            self.schema.len()
        ));

        let (slots, log) = self.process_rows(data).await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if log.is_empty() {
            run.advance(RunState::Succeeded);
            info!(run_id = progress.run_id(), rows = total, elapsed_ms, "Validation succeeded");
            progress.success(format!("No errors found in {} rows ({} ms)", total, elapsed_ms));

            let mut out = Vec::with_capacity(total + 1);
            out.push(header.cells);
            out.extend(slots.into_iter().flatten());
            Ok(RunOutcome::Succeeded(TransformedTable {
                rows: out,
                delimiter,
                encoding: source.encoding.clone(),
            }))
        } else {
            run.advance(RunState::Failed);
            let report = log.into_report();
            info!(
                run_id = progress.run_id(),
                rows = total,
                errors = report.total(),
                elapsed_ms,
                "Validation failed"
            );
            for (column, diagnostics) in report.columns() {
                progress.error(format!(
                    "Column {} has {} error(s)",
                    column + 1,
                    diagnostics.len()
                ));
            }
            Ok(RunOutcome::Failed(report))
        }
    }

    /// Fan rows out to workers and gather every result.
    ///
    /// Returns the transformed rows indexed by input position and the merged
    /// error log. Every worker is awaited even if one of them crashed.
    async fn process_rows(
        &self,
        data: Vec<SourceRow>,
    ) -> PipelineResult<(Vec<Option<Vec<String>>>, ErrorLog)> {
        let mut slots: Vec<Option<Vec<String>>> = vec![None; data.len()];
        let mut log = ErrorLog::new();
        let mut first_failure: Option<PipelineError> = None;

        let workers = self.options.workers.max(1);
        debug!(rows = data.len(), workers, "Spawning row workers");

        let tasks = data.into_iter().enumerate().map(|(index, row)| {
            let schema = Arc::clone(&self.schema);
            let validator = Arc::clone(&self.validator);
            let line = row.line;
            async move {
                tokio::spawn(async move { process_row(index, row, &schema, &validator) })
                    .await
                    .map_err(|e| PipelineError::Worker {
                        line,
                        message: e.to_string(),
                    })
            }
        });

        let mut results = stream::iter(tasks).buffer_unordered(workers);
        while let Some(result) = results.next().await {
            match result {
                Ok(outcome) => {
                    log.extend(outcome.errors);
                    slots[outcome.index] = Some(outcome.cells);
                }
                Err(e) => {
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok((slots, log)),
        }
    }
}

/// What a single row worker hands back to the aggregator.
#[derive(Debug)]
struct RowOutcome {
    index: usize,
    cells: Vec<String>,
    errors: Vec<(usize, Diagnostic)>,
}

/// Transform then validate one data row.
fn process_row(index: usize, row: SourceRow, schema: &Schema, validator: &Validator) -> RowOutcome {
    let SourceRow { line, mut cells } = row;
    transform_row(&mut cells, schema);

    let mut errors = Vec::new();
    for (column, rule) in schema.iter() {
        let value = cells.get(column);
        let result = match value {
            Some(v) => validator.validate(v, rule),
            None => Err(Violation::missing(rule.value_type)),
        };
        if let Err(violation) = result {
            errors.push((column, Diagnostic::new(line, value.cloned(), violation)));
        }
    }

    RowOutcome {
        index,
        cells,
        errors,
    }
}

#[derive(Debug)]
struct RunTracker {
    state: RunState,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
        }
    }
}

impl RunTracker {
    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal run transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "Run state transition");
        self.state = next;
    }
}

/// Load a source file and run it against `schema`.
pub async fn validate_file(
    path: impl AsRef<Path>,
    schema: Schema,
    options: PipelineOptions,
) -> PipelineResult<RunOutcome> {
    let path = path.as_ref();
    let mut options = options;
    let run_id = options
        .run_id
        .get_or_insert_with(|| Uuid::new_v4().to_string())
        .clone();
    RunLogger::new(run_id).info(format!("Reading {}", path.display()));

    let source = Source::from_path(path)?;
    debug!(encoding = %source.encoding, "Source decoded");
    Pipeline::new(schema, Validator::new())
        .with_options(options)
        .run(&source)
        .await
}

/// Format delimiter for display
pub fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}
