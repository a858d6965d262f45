//! Reshaped output.
//!
//! Every function here takes the row set of a successful run: header at
//! index 0, data rows after it. Header cells are renamed through the schema
//! (`target`, or the original header when a column has no target).

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Settings;
use crate::error::{ExportError, ExportResult};
use crate::schema::Schema;

/// Shape of a preview response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewFormat {
    #[default]
    Json,
    Csv,
}

/// Header row with every ruled column renamed to its target.
pub fn relabel_header(header: &[String], schema: &Schema) -> Vec<String> {
    header
        .iter()
        .enumerate()
        .map(|(i, h)| schema.target_name(i, h).to_string())
        .collect()
}

/// Serialize the relabelled header and all data rows.
pub fn to_delimited(rows: &[Vec<String>], schema: &Schema, delimiter: char) -> ExportResult<String> {
    write_rows(rows, schema, usize::MAX, delimiter)
}

/// Header plus the first `size` data rows, delimited.
pub fn to_delimited_preview(
    rows: &[Vec<String>],
    schema: &Schema,
    size: usize,
    delimiter: char,
) -> ExportResult<String> {
    write_rows(rows, schema, size, delimiter)
}

/// First `size` data rows as an array of objects keyed by renamed header.
///
/// Keys keep column order. A key already taken by an earlier column gets
/// its 1-based column number appended (`name_3`). A row shorter than the
/// header gets `""` for the missing keys; cells beyond the header are dropped.
pub fn to_json_preview(rows: &[Vec<String>], schema: &Schema, size: usize) -> ExportResult<Value> {
    let (header, data) = rows.split_first().ok_or(ExportError::NoData)?;
    let header = unique_keys(relabel_header(header, schema));

    let items = data
        .iter()
        .take(size)
        .map(|row| {
            let mut obj = Map::new();
            for (i, key) in header.iter().enumerate() {
                let cell = row.get(i).cloned().unwrap_or_default();
                obj.insert(key.clone(), Value::String(cell));
            }
            Value::Object(obj)
        })
        .collect();

    Ok(Value::Array(items))
}

fn unique_keys(header: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    header
        .into_iter()
        .enumerate()
        .map(|(i, key)| {
            let key = if seen.contains(&key) {
                format!("{}_{}", key, i + 1)
            } else {
                key
            };
            seen.insert(key.clone());
            key
        })
        .collect()
}

/// Write the reshaped rows to `<stem>_<YYYYMMDD_HHMMSS>.csv`.
///
/// The file goes to `settings.output_dir` when set, otherwise next to the
/// source. Returns the path written.
pub fn write_transformed(
    source_path: &Path,
    rows: &[Vec<String>],
    schema: &Schema,
    settings: &Settings,
) -> ExportResult<PathBuf> {
    let content = to_delimited(rows, schema, settings.output_delimiter)?;

    let dir = match &settings.output_dir {
        Some(dir) => dir.clone(),
        None => source_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    let path = dir.join(output_file_name(source_path));

    if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(&dir).map_err(|source| ExportError::Io {
            path: dir.display().to_string(),
            source,
        })?;
    }
    std::fs::write(&path, content).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })?;

    info!(path = %path.display(), rows = rows.len().saturating_sub(1), "Wrote reshaped file");
    Ok(path)
}

fn output_file_name(source_path: &Path) -> String {
    let stem = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    format!("{}_{}.csv", stem, Local::now().format("%Y%m%d_%H%M%S"))
}

fn write_rows(
    rows: &[Vec<String>],
    schema: &Schema,
    size: usize,
    delimiter: char,
) -> ExportResult<String> {
    let delimiter_byte = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or(ExportError::UnsupportedDelimiter(delimiter))?;
    let (header, data) = rows.split_first().ok_or(ExportError::NoData)?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_byte)
        .flexible(true)
        .from_writer(Vec::new());

    writer.write_record(relabel_header(header, schema))?;
    for row in data.iter().take(size) {
        writer.write_record(row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8(bytes)?)
}
