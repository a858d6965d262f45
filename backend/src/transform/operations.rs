//! Column transformation operations.
//!
//! Every operation is a pure function of the current row and the index of the
//! column it rewrites. The set is closed: adding a new kind means adding a
//! variant here and one decoding arm in [`Transformation::try_from`].
//!
//! Wire format (inside a schema rule's `transformations` array):
//!
//! ```json
//! { "action": "convert", "param": { "map": { "M": "male" }, "case": false, "default": "?" } }
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One step of a column's transformation chain.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawTransformation")]
pub enum Transformation {
    /// Remove leading and trailing whitespace
    Trim,

    /// Substitute the whole value using a lookup table
    Convert {
        map: BTreeMap<String, String>,
        case_sensitive: bool,
        /// Used when nothing matches; `None` keeps the original value
        default: Option<String>,
    },

    /// Keep what comes before the first occurrence of `delimiter`
    Before { delimiter: String },

    /// Keep what comes after the first occurrence of `delimiter`
    After { delimiter: String },

    /// Character slice `[start, start + size)`; `size == 0` means to the end
    Substring { start: usize, size: usize },

    /// Append the value of another column
    Concat { column: i64 },

    /// Append a literal string
    AddSuffix { text: String },
}

/// Envelope shared by every action: a tag plus an action-specific object.
#[derive(Debug, Deserialize)]
struct RawTransformation {
    action: String,
    #[serde(default)]
    param: Value,
}

#[derive(Debug, Deserialize)]
struct ConvertParam {
    #[serde(default)]
    map: BTreeMap<String, String>,
    #[serde(default, rename = "case", alias = "caseSensitive")]
    case_sensitive: bool,
    #[serde(default)]
    default: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DelimiterParam {
    #[serde(default)]
    delimiter: String,
}

#[derive(Debug, Deserialize)]
struct SubstringParam {
    #[serde(default)]
    start: usize,
    #[serde(default)]
    size: usize,
}

#[derive(Debug, Deserialize)]
struct ConcatParam {
    #[serde(rename = "columnId")]
    column_id: i64,
}

#[derive(Debug, Deserialize)]
struct AddSuffixParam {
    #[serde(rename = "addString", alias = "text")]
    text: String,
}

fn decode_param<T: serde::de::DeserializeOwned>(action: &str, param: Value) -> Result<T, String> {
    let param = if param.is_null() { Value::Object(Map::new()) } else { param };
    serde_json::from_value(param).map_err(|e| format!("invalid param for '{}': {}", action, e))
}

impl TryFrom<RawTransformation> for Transformation {
    type Error = String;

    fn try_from(raw: RawTransformation) -> Result<Self, Self::Error> {
        let action = raw.action.as_str();
        match action {
            "trim" => Ok(Transformation::Trim),
            "convert" => {
                let p: ConvertParam = decode_param(action, raw.param)?;
                Ok(Transformation::Convert {
                    map: p.map,
                    case_sensitive: p.case_sensitive,
                    default: p.default.filter(|d| !d.is_empty()),
                })
            }
            "before" => {
                let p: DelimiterParam = decode_param(action, raw.param)?;
                Ok(Transformation::Before { delimiter: p.delimiter })
            }
            "after" => {
                let p: DelimiterParam = decode_param(action, raw.param)?;
                Ok(Transformation::After { delimiter: p.delimiter })
            }
            "substring" => {
                let p: SubstringParam = decode_param(action, raw.param)?;
                Ok(Transformation::Substring { start: p.start, size: p.size })
            }
            "concat" => {
                let p: ConcatParam = decode_param(action, raw.param)?;
                Ok(Transformation::Concat { column: p.column_id })
            }
            "addString" | "addSuffix" => {
                let p: AddSuffixParam = decode_param(action, raw.param)?;
                Ok(Transformation::AddSuffix { text: p.text })
            }
            other => Err(format!("unknown transformation action '{}'", other)),
        }
    }
}

impl Transformation {
    /// Compute the new value of `row[index]`.
    ///
    /// Reads the row as it is at call time; sibling columns are never mutated.
    /// An `index` outside the row is treated as an empty value.
    pub fn apply(&self, row: &[String], index: usize) -> String {
        let value = row.get(index).map(String::as_str).unwrap_or("");
        match self {
            Transformation::Trim => value.trim().to_string(),
            Transformation::Convert { map, case_sensitive, default } => {
                apply_convert(value, map, *case_sensitive, default.as_deref())
            }
            Transformation::Before { delimiter } => apply_before(value, delimiter),
            Transformation::After { delimiter } => apply_after(value, delimiter),
            Transformation::Substring { start, size } => apply_substring(value, *start, *size),
            Transformation::Concat { column } => apply_concat(row, value, *column),
            Transformation::AddSuffix { text } => format!("{}{}", value, text),
        }
    }

    /// The wire tag of this operation.
    pub fn action(&self) -> &'static str {
        match self {
            Transformation::Trim => "trim",
            Transformation::Convert { .. } => "convert",
            Transformation::Before { .. } => "before",
            Transformation::After { .. } => "after",
            Transformation::Substring { .. } => "substring",
            Transformation::Concat { .. } => "concat",
            Transformation::AddSuffix { .. } => "addString",
        }
    }
}

/// Run a chain over `row[index]` in declared order, writing the result back.
///
/// Step N+1 sees the output of step N. Other columns are left untouched.
pub fn apply_chain(chain: &[Transformation], row: &mut [String], index: usize) {
    if index >= row.len() {
        return;
    }
    for step in chain {
        let next = step.apply(row, index);
        row[index] = next;
    }
}

fn apply_convert(
    value: &str,
    map: &BTreeMap<String, String>,
    case_sensitive: bool,
    default: Option<&str>,
) -> String {
    let found = if case_sensitive {
        map.get(value)
    } else {
        let needle = value.to_lowercase();
        map.iter()
            .find(|(k, _)| k.to_lowercase() == needle)
            .map(|(_, v)| v)
    };

    match (found, default) {
        (Some(v), _) => v.clone(),
        (None, Some(d)) => d.to_string(),
        (None, None) => value.to_string(),
    }
}

fn apply_before(value: &str, delimiter: &str) -> String {
    if delimiter.is_empty() {
        return value.to_string();
    }
    match value.find(delimiter) {
        Some(pos) => value[..pos].to_string(),
        None => value.to_string(),
    }
}

fn apply_after(value: &str, delimiter: &str) -> String {
    if delimiter.is_empty() {
        return value.to_string();
    }
    match value.find(delimiter) {
        Some(pos) => value[pos + delimiter.len()..].to_string(),
        None => value.to_string(),
    }
}

fn apply_substring(value: &str, start: usize, size: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if start >= chars.len() {
        return String::new();
    }
    let end = if size == 0 {
        chars.len()
    } else {
        start.saturating_add(size).min(chars.len())
    };
    chars[start..end].iter().collect()
}

fn apply_concat(row: &[String], value: &str, column: i64) -> String {
    let other = usize::try_from(column).ok().and_then(|i| row.get(i));
    match other {
        Some(other) => format!("{}{}", value, other),
        None => value.to_string(),
    }
}

/// Get a description of all available transformation actions
pub fn operations_description() -> String {
    r#"Available transformation actions:

| Action    | Description                                   | Params                                               |
|-----------|-----------------------------------------------|------------------------------------------------------|
| trim      | Remove leading/trailing whitespace            | -                                                    |
| convert   | Replace the whole value using a lookup table  | map: {from: to}, case: bool (default false), default |
| before    | Keep text before the first delimiter          | delimiter                                            |
| after     | Keep text after the first delimiter           | delimiter                                            |
| substring | Character slice, clamped to the value         | start, size (0 = to end)                             |
| concat    | Append another column's current value         | columnId (zero-based)                                |
| addString | Append a literal (alias: addSuffix)           | addString (alias: text)                              |

Rules run in ascending column order on the row being built, so a concat
reading a lower column sees its transformed value and a higher column its
original value.

Example transformations in JSON:
[
  {"action": "trim"},
  {"action": "convert", "param": {"map": {"M": "male", "F": "female"}, "case": false}},
  {"action": "before", "param": {"delimiter": "@"}},
  {"action": "substring", "param": {"start": 0, "size": 3}},
  {"action": "concat", "param": {"columnId": 2}},
  {"action": "addString", "param": {"addString": "_fr"}}
]"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn decode(v: Value) -> Transformation {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_trim() {
        let r = row(&["  hello  "]);
        assert_eq!(Transformation::Trim.apply(&r, 0), "hello");
    }

    #[test]
    fn test_convert_case_insensitive() {
        let op = decode(json!({"action": "convert", "param": {"map": {"A": "x"}, "case": false}}));
        assert_eq!(op.apply(&row(&["a"]), 0), "x");
        assert_eq!(op.apply(&row(&["A"]), 0), "x");
    }

    #[test]
    fn test_convert_case_sensitive_and_fallbacks() {
        let op = decode(json!({"action": "convert", "param": {"map": {"A": "x"}, "case": true}}));
        assert_eq!(op.apply(&row(&["A"]), 0), "x");
        // No match and no default keeps the original value
        assert_eq!(op.apply(&row(&["a"]), 0), "a");

        let op = decode(json!({"action": "convert", "param": {"map": {"A": "x"}, "case": true, "default": "?"}}));
        assert_eq!(op.apply(&row(&["a"]), 0), "?");

        // Empty default counts as unset
        let op = decode(json!({"action": "convert", "param": {"map": {}, "default": ""}}));
        assert_eq!(op.apply(&row(&["keep"]), 0), "keep");
    }

    #[test]
    fn test_before_after() {
        let before = decode(json!({"action": "before", "param": {"delimiter": "@"}}));
        let after = decode(json!({"action": "after", "param": {"delimiter": "@"}}));
        let r = row(&["john@example.com"]);
        assert_eq!(before.apply(&r, 0), "john");
        assert_eq!(after.apply(&r, 0), "example.com");

        let r = row(&["no-delimiter"]);
        assert_eq!(before.apply(&r, 0), "no-delimiter");
        assert_eq!(after.apply(&r, 0), "no-delimiter");

        let empty = decode(json!({"action": "after", "param": {"delimiter": ""}}));
        assert_eq!(empty.apply(&row(&["a@b"]), 0), "a@b");
    }

    #[test]
    fn test_after_multichar_delimiter() {
        let op = decode(json!({"action": "after", "param": {"delimiter": "::"}}));
        assert_eq!(op.apply(&row(&["key::value::rest"]), 0), "value::rest");
    }

    #[test]
    fn test_substring_clamped() {
        let op = Transformation::Substring { start: 0, size: 3 };
        assert_eq!(op.apply(&row(&["hi"]), 0), "hi");
        assert_eq!(op.apply(&row(&["hello"]), 0), "hel");
    }

    #[test]
    fn test_substring_slice_law() {
        let value = "abcdef";
        let len = value.chars().count();
        for start in 0..8 {
            for size in 0..8 {
                let got = Transformation::Substring { start, size }.apply(&row(&[value]), 0);
                let expected: String = if start >= len {
                    String::new()
                } else {
                    let end = if size == 0 { len } else { (start + size).min(len) };
                    value[start..end].to_string()
                };
                assert_eq!(got, expected, "start={} size={}", start, size);
            }
        }
    }

    #[test]
    fn test_substring_counts_characters() {
        let op = Transformation::Substring { start: 1, size: 3 };
        assert_eq!(op.apply(&row(&["Société"]), 0), "oci");
    }

    #[test]
    fn test_concat_reads_sibling() {
        let op = decode(json!({"action": "concat", "param": {"columnId": 1}}));
        let r = row(&["first", "second"]);
        assert_eq!(op.apply(&r, 0), "firstsecond");
        // Sibling is not mutated
        assert_eq!(r[1], "second");
    }

    #[test]
    fn test_concat_out_of_range_is_noop() {
        let r = row(&["a", "b"]);
        assert_eq!(Transformation::Concat { column: 5 }.apply(&r, 0), "a");
        assert_eq!(Transformation::Concat { column: -1 }.apply(&r, 0), "a");
    }

    #[test]
    fn test_add_suffix_both_tags() {
        let a = decode(json!({"action": "addString", "param": {"addString": "_x"}}));
        let b = decode(json!({"action": "addSuffix", "param": {"text": "_x"}}));
        assert_eq!(a, b);
        assert_eq!(a.apply(&row(&["v"]), 0), "v_x");
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = serde_json::from_value::<Transformation>(json!({"action": "explode"})).unwrap_err();
        assert!(err.to_string().contains("unknown transformation action 'explode'"));
    }

    #[test]
    fn test_bad_param_rejected() {
        let err = serde_json::from_value::<Transformation>(json!({"action": "concat", "param": {}})).unwrap_err();
        assert!(err.to_string().contains("invalid param for 'concat'"));
    }

    #[test]
    fn test_chain_runs_in_declared_order() {
        let chain = vec![
            Transformation::Trim,
            Transformation::Before { delimiter: "-".into() },
            Transformation::AddSuffix { text: "!".into() },
        ];
        let mut r = row(&["  ab-cd  ", "other"]);
        apply_chain(&chain, &mut r, 0);
        assert_eq!(r, row(&["ab!", "other"]));

        // Reversed order gives a different result
        let reversed: Vec<_> = chain.into_iter().rev().collect();
        let mut r = row(&["  ab-cd  ", "other"]);
        apply_chain(&reversed, &mut r, 0);
        assert_eq!(r[0], "ab");
    }
}
