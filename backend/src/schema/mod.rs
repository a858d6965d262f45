//! Column schema model.
//!
//! A schema maps zero-based column indexes to a [`FieldRule`]. It is built
//! once per run, never mutated afterwards, and shared read-only (behind an
//! `Arc`) by every row worker.
//!
//! # JSON format
//!
//! ```json
//! {
//!   "0": { "type": "required", "target": "name" },
//!   "1": { "type": "int", "target": "age", "transformations": [{ "action": "trim" }] },
//!   "2": { "type": "equals", "target": "sex", "equalValues": ["M", "F"] }
//! }
//! ```

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use crate::error::{SchemaError, SchemaResult};
use crate::transform::Transformation;

/// The check applied to a column after its transformations.
///
/// An unknown tag fails deserialization, so a bad type is reported when the
/// schema is loaded rather than while rows are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Required,
    Int,
    Float,
    Email,
    Date,
    Equals,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Required => "required",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Email => "email",
            ValueType::Date => "date",
            ValueType::Equals => "equals",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rules for a single column.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    /// Validation type
    #[serde(rename = "type")]
    pub value_type: ValueType,

    /// Header name used on export
    #[serde(default)]
    pub target: String,

    /// Allowed values, only meaningful for [`ValueType::Equals`]
    #[serde(default, rename = "equalValues")]
    pub expected_values: Vec<String>,

    /// Applied in declared order before validation
    #[serde(default)]
    pub transformations: Vec<Transformation>,
}

impl FieldRule {
    pub fn new(value_type: ValueType, target: impl Into<String>) -> Self {
        Self {
            value_type,
            target: target.into(),
            expected_values: Vec::new(),
            transformations: Vec::new(),
        }
    }

    pub fn with_expected_values(mut self, values: Vec<String>) -> Self {
        self.expected_values = values;
        self
    }

    pub fn with_transformation(mut self, t: Transformation) -> Self {
        self.transformations.push(t);
        self
    }
}

/// Column index → rule, iterated in ascending column order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "BTreeMap<String, FieldRule>")]
pub struct Schema {
    rules: BTreeMap<usize, FieldRule>,
}

impl TryFrom<BTreeMap<String, FieldRule>> for Schema {
    type Error = SchemaError;

    fn try_from(raw: BTreeMap<String, FieldRule>) -> Result<Self, Self::Error> {
        let rules = raw
            .into_iter()
            .map(|(key, rule)| match key.trim().parse::<usize>() {
                Ok(column) => Ok((column, rule)),
                Err(_) => Err(SchemaError::InvalidColumnKey(key)),
            })
            .collect::<SchemaResult<Vec<_>>>()?;
        Self::from_rules(rules)
    }
}

impl Schema {
    /// Build a schema from already-indexed rules.
    ///
    /// Rejects a column given twice, an `equals` rule without values, and two
    /// columns exported under the same non-empty target.
    pub fn from_rules(rules: impl IntoIterator<Item = (usize, FieldRule)>) -> SchemaResult<Self> {
        let mut map = BTreeMap::new();
        for (column, rule) in rules {
            if rule.value_type == ValueType::Equals && rule.expected_values.is_empty() {
                return Err(SchemaError::MissingExpectedValues { column });
            }
            if map.insert(column, rule).is_some() {
                return Err(SchemaError::DuplicateColumn(column));
            }
        }

        let mut targets: HashMap<&str, usize> = HashMap::new();
        for (column, rule) in &map {
            if rule.target.is_empty() {
                continue;
            }
            if let Some(first) = targets.insert(rule.target.as_str(), *column) {
                return Err(SchemaError::DuplicateTarget {
                    target: rule.target.clone(),
                    first,
                    second: *column,
                });
            }
        }

        Ok(Self { rules: map })
    }

    /// Parse a schema from a JSON string.
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        let raw: BTreeMap<String, FieldRule> = serde_json::from_str(json)?;
        Self::try_from(raw)
    }

    /// Parse a schema from a JSON value.
    pub fn from_value(value: Value) -> SchemaResult<Self> {
        let raw: BTreeMap<String, FieldRule> = serde_json::from_value(value)?;
        Self::try_from(raw)
    }

    /// Load a schema from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn rule(&self, column: usize) -> Option<&FieldRule> {
        self.rules.get(&column)
    }

    /// Rules in ascending column order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &FieldRule)> {
        self.rules.iter().map(|(i, r)| (*i, r))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Export name for a column: the rule's target, or the original header
    /// when the column has no rule or an empty target.
    pub fn target_name<'a>(&'a self, column: usize, original: &'a str) -> &'a str {
        match self.rules.get(&column) {
            Some(rule) if !rule.target.is_empty() => &rule.target,
            _ => original,
        }
    }
}

/// An example schema exercising every type and action.
pub fn example_schema() -> Value {
    json!({
        "0": {
            "type": "required",
            "target": "full_name",
            "transformations": [
                { "action": "trim" },
                { "action": "concat", "param": { "columnId": 1 } }
            ]
        },
        "2": {
            "type": "email",
            "target": "mail",
            "transformations": [{ "action": "trim" }]
        },
        "3": {
            "type": "int",
            "target": "age",
            "transformations": [{ "action": "before", "param": { "delimiter": " " } }]
        },
        "4": {
            "type": "equals",
            "target": "sex",
            "equalValues": ["M", "F"],
            "transformations": [
                { "action": "convert", "param": { "map": { "male": "M", "female": "F" }, "case": false } }
            ]
        },
        "5": {
            "type": "date",
            "target": "birth_date",
            "transformations": [{ "action": "substring", "param": { "start": 0, "size": 10 } }]
        },
        "6": {
            "type": "float",
            "target": "score",
            "transformations": [{ "action": "after", "param": { "delimiter": ":" } }]
        },
        "7": {
            "type": "required",
            "target": "country",
            "transformations": [{ "action": "addString", "param": { "addString": "_EU" } }]
        }
    })
}
