//! Per-column diagnostics and the human-readable error report.
//!
//! Row workers never share an [`ErrorLog`]: each returns its own batch of
//! `(column, Diagnostic)` pairs and the pipeline's single aggregation loop
//! merges them here. [`ErrorLog::into_report`] sorts every column by line
//! number so the report does not depend on worker completion order.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::validation::{Violation, ViolationKind};

/// Appended when a rendered report is cut to a character budget.
pub const TRUNCATION_MARKER: &str = "... [report truncated]";

/// One failed check on one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// 1-based source line number
    pub line: usize,
    /// The offending (post-transformation) value; `None` if the row had no such column
    pub value: Option<String>,
    pub kind: ViolationKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, value: Option<String>, violation: Violation) -> Self {
        Self {
            line,
            value,
            kind: violation.kind,
            message: violation.message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error line {}: {}", self.line, self.message)
    }
}

/// Diagnostics grouped by zero-based column index.
#[derive(Debug, Default)]
pub struct ErrorLog {
    columns: BTreeMap<usize, Vec<Diagnostic>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, column: usize, diagnostic: Diagnostic) {
        self.columns.entry(column).or_default().push(diagnostic);
    }

    /// Merge one worker's batch.
    pub fn extend(&mut self, batch: impl IntoIterator<Item = (usize, Diagnostic)>) {
        for (column, diagnostic) in batch {
            self.record(column, diagnostic);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Total number of diagnostics across all columns.
    pub fn total(&self) -> usize {
        self.columns.values().map(Vec::len).sum()
    }

    /// Freeze into a report with each column ordered by line number.
    pub fn into_report(self) -> ErrorReport {
        let mut columns = self.columns;
        for diagnostics in columns.values_mut() {
            diagnostics.sort_by_key(|d| d.line);
        }
        ErrorReport { columns }
    }
}

/// The outcome of a failed run: every diagnostic, grouped by column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    columns: BTreeMap<usize, Vec<Diagnostic>>,
}

impl ErrorReport {
    /// Columns (zero-based) in ascending order with their diagnostics.
    pub fn columns(&self) -> impl Iterator<Item = (usize, &[Diagnostic])> {
        self.columns.iter().map(|(c, d)| (*c, d.as_slice()))
    }

    /// Diagnostics for a zero-based column.
    pub fn column(&self, column: usize) -> Option<&[Diagnostic]> {
        self.columns.get(&column).map(Vec::as_slice)
    }

    pub fn total(&self) -> usize {
        self.columns.values().map(Vec::len).sum()
    }

    /// Full report. Columns are shown 1-based.
    ///
    /// ```text
    /// Column 2 has 1 error(s):
    ///   - Error line 3: expected an integer but got 'x'
    /// ```
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (column, diagnostics) in &self.columns {
            out.push_str(&format!(
                "Column {} has {} error(s):\n",
                column + 1,
                diagnostics.len()
            ));
            for d in diagnostics {
                out.push_str(&format!("  - {}\n", d));
            }
        }
        out
    }

    /// Render, cutting to at most `max_chars` characters of report text
    /// followed by [`TRUNCATION_MARKER`]. `0` means no limit.
    pub fn render_truncated(&self, max_chars: usize) -> String {
        let full = self.render();
        if max_chars == 0 || full.chars().count() <= max_chars {
            return full;
        }
        let mut cut: String = full.chars().take(max_chars).collect();
        if !cut.ends_with('\n') {
            cut.push('\n');
        }
        cut.push_str(TRUNCATION_MARKER);
        cut
    }

    /// `{ "<1-based column>": ["Error line N: ...", ...] }`
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (column, diagnostics) in &self.columns {
            let entries = diagnostics
                .iter()
                .map(|d| Value::String(d.to_string()))
                .collect();
            map.insert((column + 1).to_string(), Value::Array(entries));
        }
        Value::Object(map)
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
