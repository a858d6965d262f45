//! Source loading: encoding detection, delimiter sniffing and row splitting.
//!
//! The whole file is read into memory up front; row workers never touch the
//! filesystem.

use std::path::{Path, PathBuf};

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use tracing::debug;

use crate::error::{SourceError, SourceResult};

/// Separators considered by [`detect_delimiter`], in tie-break order.
pub const DELIMITER_CANDIDATES: [char; 3] = [',', ';', '|'];

/// Number of leading lines sampled for delimiter detection.
pub const SAMPLE_LINES: usize = 5;

/// Below this, a chardet guess for non-UTF-8 input is ignored.
const MIN_CHARSET_CONFIDENCE: f32 = 0.9;

/// Shorter non-UTF-8 inputs are read as Windows-1252 without asking chardet.
const MIN_CHARSET_SAMPLE: usize = 1024;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A decoded source file, ready to be split into rows.
#[derive(Debug, Clone)]
pub struct Source {
    /// Decoded text content
    pub content: String,
    /// Detected or assumed encoding
    pub encoding: String,
    /// Where the content came from, if it was a file
    pub path: Option<PathBuf>,
}

/// One line of the source split into cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// 1-based line number in the source
    pub line: usize,
    pub cells: Vec<String>,
}

impl Source {
    /// Read and decode a file. A missing or unreadable file is an error,
    /// never an empty source.
    pub fn from_path(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| SourceError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut source = Self::from_bytes(&bytes)?;
        source.path = Some(path.to_path_buf());
        Ok(source)
    }

    /// Decode raw bytes with encoding auto-detection.
    pub fn from_bytes(bytes: &[u8]) -> SourceResult<Self> {
        if bytes.is_empty() {
            return Err(SourceError::EmptyFile);
        }
        let encoding = detect_encoding(bytes);
        let content = decode_content(bytes, &encoding);
        Ok(Self {
            content,
            encoding,
            path: None,
        })
    }

    /// Wrap already-decoded text.
    pub fn from_string(content: impl Into<String>) -> SourceResult<Self> {
        let content = content.into();
        if content.is_empty() {
            return Err(SourceError::EmptyFile);
        }
        Ok(Self {
            content,
            encoding: UTF_8.name().to_string(),
            path: None,
        })
    }

    /// The bounded prefix used for delimiter detection.
    pub fn sample_lines(&self) -> Vec<&str> {
        self.content.lines().take(SAMPLE_LINES).collect()
    }

    /// Split the content into rows using `delimiter`.
    pub fn rows(&self, delimiter: char) -> SourceResult<Vec<SourceRow>> {
        split_rows(&self.content, delimiter)
    }
}

/// Detect the encoding of raw bytes.
///
/// Valid UTF-8 (with or without a byte-order mark) is always taken as UTF-8.
/// Anything else goes through chardet. Its guess is kept only when the
/// sample is long enough to judge, the guess is confident, names an encoding
/// `encoding_rs` knows, and decodes the bytes without malformed sequences.
/// Otherwise the bytes are read as Windows-1252, the superset of ISO-8859-1.
///
/// Returns the canonical encoding name (`"UTF-8"`, `"windows-1252"`, ...).
pub fn detect_encoding(bytes: &[u8]) -> String {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if std::str::from_utf8(body).is_ok() {
        return UTF_8.name().to_string();
    }

    let (charset, confidence, _) = chardet::detect(bytes);
    let guessed = Encoding::for_label(chardet::charset2encoding(&charset).as_bytes())
        .filter(|_| bytes.len() >= MIN_CHARSET_SAMPLE && confidence >= MIN_CHARSET_CONFIDENCE)
        .filter(|enc| *enc != UTF_8)
        .filter(|enc| {
            enc.decode_without_bom_handling_and_without_replacement(bytes)
                .is_some()
        });
    let encoding = guessed.unwrap_or(WINDOWS_1252);

    debug!(
        charset = %charset,
        confidence,
        encoding = encoding.name(),
        "Source is not UTF-8"
    );
    encoding.name().to_string()
}

/// Decode bytes with the named encoding.
///
/// An unknown label decodes as Windows-1252. A leading byte-order mark is
/// dropped.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let encoding = Encoding::for_label(encoding.as_bytes()).unwrap_or(WINDOWS_1252);
    let (decoded, _, _) = encoding.decode(bytes);
    decoded.into_owned()
}

/// Pick the delimiter occurring most often across the sampled lines.
///
/// Only the first [`SAMPLE_LINES`] entries are inspected. Ties, including a
/// sample with no candidate at all, resolve to the earliest entry of
/// [`DELIMITER_CANDIDATES`], so `,` is the default.
pub fn detect_delimiter<S: AsRef<str>>(sample_lines: &[S]) -> char {
    let mut best_sep = DELIMITER_CANDIDATES[0];
    let mut best_count = 0;

    for &sep in &DELIMITER_CANDIDATES {
        let count: usize = sample_lines
            .iter()
            .take(SAMPLE_LINES)
            .map(|line| line.as_ref().matches(sep).count())
            .sum();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    debug!(delimiter = %best_sep, occurrences = best_count, "Detected delimiter");
    best_sep
}

/// Split delimited text into rows, keeping each row's source line number.
///
/// Quoted cells may contain the delimiter. Rows may have differing lengths.
/// Blank lines are skipped without shifting the line numbers of later rows.
pub fn split_rows(content: &str, delimiter: char) -> SourceResult<Vec<SourceRow>> {
    let delimiter_byte = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or(SourceError::UnsupportedDelimiter(delimiter))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(rows.len() + 1);
        rows.push(SourceRow {
            line,
            cells: record.iter().map(String::from).collect(),
        });
    }

    if rows.is_empty() {
        return Err(SourceError::EmptyFile);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_delimiter_comma() {
        assert_eq!(detect_delimiter(&["a,b,c", "1,2,3"]), ',');
    }

    #[test]
    fn test_detect_delimiter_semicolon() {
        assert_eq!(detect_delimiter(&["a;b;c", "1;2;3"]), ';');
    }

    #[test]
    fn test_detect_delimiter_pipe() {
        assert_eq!(detect_delimiter(&["a|b|c", "1|2|3"]), '|');
    }

    #[test]
    fn test_detect_delimiter_tie_defaults_to_comma() {
        assert_eq!(detect_delimiter(&["a,b;c"]), ',');
        assert_eq!(detect_delimiter(&["single"]), ',');
        assert_eq!(detect_delimiter::<&str>(&[]), ',');
    }

    #[test]
    fn test_detect_delimiter_counts_across_lines() {
        // Header alone favours ',', the data lines tip it to ';'
        let lines = ["name,first", "a;b;c", "d;e;f"];
        assert_eq!(detect_delimiter(&lines), ';');
    }

    #[test]
    fn test_detect_delimiter_ignores_lines_after_sample() {
        let mut lines = vec!["a,b"; SAMPLE_LINES];
        lines.extend(vec!["a;b;c;d;e;f;g"; 10]);
        assert_eq!(detect_delimiter(&lines), ',');
    }

    #[test]
    fn test_detect_delimiter_idempotent() {
        let source = Source::from_string("a;b\n1;2\n3,4").unwrap();
        let sample = source.sample_lines();
        assert_eq!(detect_delimiter(&sample), detect_delimiter(&sample));
    }

    #[test]
    fn test_split_rows_line_numbers() {
        let rows = split_rows("name,age\nAlice,30\n\nBob,x\n", ',').unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].line, 1);
        assert_eq!(rows[1].line, 2);
        assert_eq!(rows[2].line, 4);
        assert_eq!(rows[2].cells, vec!["Bob", "x"]);
    }

    #[test]
    fn test_split_rows_keeps_whitespace_and_handles_quotes() {
        let rows = split_rows("email;note\n  a@b.com ;\"x;y\"", ';').unwrap();
        assert_eq!(rows[1].cells, vec!["  a@b.com ", "x;y"]);
    }

    #[test]
    fn test_split_rows_flexible_lengths() {
        let rows = split_rows("a,b,c\n1\n1,2,3,4", ',').unwrap();
        assert_eq!(rows[1].cells.len(), 1);
        assert_eq!(rows[2].cells.len(), 4);
    }

    #[test]
    fn test_split_rows_rejects_non_ascii_delimiter() {
        let err = split_rows("a§b", '§').unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedDelimiter('§')));
    }

    #[test]
    fn test_empty_source() {
        assert!(matches!(Source::from_bytes(b""), Err(SourceError::EmptyFile)));
        assert!(matches!(split_rows("\n\n", ','), Err(SourceError::EmptyFile)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Source::from_path("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.csv"));
    }

    #[test]
    fn test_from_path_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "a;b\n1;2\n").unwrap();
        let source = Source::from_path(file.path()).unwrap();
        assert_eq!(source.encoding, "UTF-8");
        assert_eq!(source.path.as_deref(), Some(file.path()));
        assert_eq!(detect_delimiter(&source.sample_lines()), ';');
    }

    #[test]
    fn test_short_utf8_is_not_reinterpreted() {
        for text in ["name\nMüller\n", "n\nÅsa\n", "id,name\n1,Müller\n", "ville\nSão Paulo\n"] {
            let source = Source::from_bytes(text.as_bytes()).unwrap();
            assert_eq!(source.encoding, "UTF-8");
            assert_eq!(source.content, text);
        }
    }

    #[test]
    fn test_utf8_with_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("a,b\nç,é\n".as_bytes());
        let source = Source::from_bytes(&bytes).unwrap();
        assert_eq!(source.encoding, "UTF-8");
        assert_eq!(source.content, "a,b\nç,é\n");
    }

    #[test]
    fn test_short_latin1_source() {
        let source = Source::from_bytes(b"x\nCaf\xe9\n").unwrap();
        assert_eq!(source.content, "x\nCafé\n");

        let source = Source::from_bytes(b"a;b\n\xe7\xe0;\xfc\n").unwrap();
        assert_eq!(source.content, "a;b\nçà;ü\n");
        assert_eq!(source.encoding, "windows-1252");
    }

    #[test]
    fn test_latin1_label_keeps_currency_sign() {
        // 0xA4 is '¤' in ISO-8859-1, not '€'
        assert_eq!(decode_content(b"\xa4", "iso-8859-1"), "¤");
        assert_eq!(decode_content(b"\xe9", "no-such-charset"), "é");
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_bom_is_stripped() {
        let decoded = decode_content("\u{feff}a,b".as_bytes(), "utf-8");
        assert_eq!(decoded, "a,b");
    }
}
