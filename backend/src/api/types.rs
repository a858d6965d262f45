//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::export::PreviewFormat;
use crate::transform::pipeline::{format_delimiter, TransformedTable};
use crate::transform::report::ErrorReport;

/// Body of `POST /validate-csv`.
///
/// `structure` is kept as raw JSON so schema defects are reported as a
/// configuration error (400) rather than an extractor rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateRequest {
    pub structure: Value,
    /// Local path of the source file
    pub csv_url: String,
    /// Preview this many data rows instead of writing a file
    #[serde(default)]
    pub size: Option<usize>,
    #[serde(default)]
    pub format: PreviewFormat,
}

impl ValidateRequest {
    /// A preview is requested when `size` is present and non-zero.
    pub fn preview_size(&self) -> Option<usize> {
        self.size.filter(|n| *n > 0)
    }
}

/// Sent after a successful run wrote the reshaped file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub job_id: String,
    /// Always "ready"
    pub status: String,
    pub output_file: String,
    pub metadata: SourceMetadata,
}

impl ReadyResponse {
    /// `job_id` is the run id carried by the progress entries of this run.
    pub fn new(job_id: String, output_file: String, metadata: SourceMetadata) -> Self {
        Self {
            job_id,
            status: "ready".to_string(),
            output_file,
            metadata,
        }
    }
}

/// What was learned about the source while reading it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl From<&TransformedTable> for SourceMetadata {
    fn from(table: &TransformedTable) -> Self {
        Self {
            encoding: table.encoding.clone(),
            delimiter: format_delimiter(table.delimiter),
            row_count: table.data_rows().len(),
            columns: table.header().to_vec(),
        }
    }
}

/// Sent with 422 when at least one field failed validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    pub job_id: String,
    /// Always "error"
    pub status: String,
    /// Rendered report, possibly truncated
    pub report: String,
    pub total_errors: usize,
    /// 1-based column → "Error line N: ..." entries
    pub errors: Value,
}

impl ValidationFailure {
    pub fn new(job_id: String, report: &ErrorReport, max_chars: usize) -> Self {
        Self {
            job_id,
            status: "error".to_string(),
            report: report.render_truncated(max_chars),
            total_errors: report.total(),
            errors: report.to_json(),
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::report::{Diagnostic, ErrorLog};
    use crate::validation::{Violation, ViolationKind};

    #[test]
    fn test_request_defaults() {
        let req: ValidateRequest = serde_json::from_value(json!({
            "structure": {"0": {"type": "required", "target": "a"}},
            "csv_url": "/tmp/a.csv"
        }))
        .unwrap();
        assert_eq!(req.size, None);
        assert_eq!(req.format, PreviewFormat::Json);
        assert_eq!(req.preview_size(), None);

        let req: ValidateRequest = serde_json::from_value(json!({
            "structure": {},
            "csv_url": "/tmp/a.csv",
            "size": 0,
            "format": "csv"
        }))
        .unwrap();
        assert_eq!(req.preview_size(), None);
        assert_eq!(req.format, PreviewFormat::Csv);
    }

    #[test]
    fn test_ready_response_shape() {
        let table = TransformedTable {
            rows: vec![vec!["a".into(), "b".into()], vec!["1".into(), "2".into()]],
            delimiter: '\t',
            encoding: "UTF-8".into(),
        };
        let response = ReadyResponse::new(
            "job-1".into(),
            "/tmp/out.csv".into(),
            SourceMetadata::from(&table),
        );
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["outputFile"], "/tmp/out.csv");
        assert_eq!(json["metadata"]["delimiter"], "\\t");
        assert_eq!(json["metadata"]["rowCount"], 1);
        assert_eq!(json["jobId"], "job-1");
    }

    #[test]
    fn test_validation_failure_shape() {
        let mut log = ErrorLog::new();
        let violation = Violation {
            kind: ViolationKind::InvalidFormat,
            message: "expected an integer but got 'x'".to_string(),
        };
        log.record(1, Diagnostic::new(3, Some("x".into()), violation));
        let body = ValidationFailure::new("job-2".into(), &log.into_report(), 0);

        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json["jobId"], "job-2");
        assert_eq!(json["status"], "error");
        assert_eq!(json["totalErrors"], 1);
        assert_eq!(json["errors"]["2"][0], "Error line 3: expected an integer but got 'x'");
        assert!(json["report"].as_str().unwrap().starts_with("Column 2 has 1 error(s):"));
    }

    #[test]
    fn test_error_response() {
        let json = error_response("boom");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");
    }
}
