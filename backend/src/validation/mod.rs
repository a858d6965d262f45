//! Typed field validation.
//!
//! A [`Validator`] is constructed explicitly and handed to the pipeline, so
//! independent runs (and tests) never share hidden state. Failures are
//! returned as [`Violation`] values, never raised: the pipeline collects them
//! per column and decides at the end of the run.
//!
//! # Example
//!
//! ```rust,ignore
//! use reshape::{FieldRule, ValueType, Validator};
//!
//! let validator = Validator::new();
//! let rule = FieldRule::new(ValueType::Int, "age");
//!
//! assert!(validator.validate("42", &rule).is_ok());
//! let violation = validator.validate("x", &rule).unwrap_err();
//! assert_eq!(violation.message, "expected an integer but got 'x'");
//! ```

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::schema::{FieldRule, ValueType};

/// Close to the HTML5 `type=email` grammar: local part, `@`, dot-separated
/// labels of letters, digits and inner hyphens.
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$";

const DATE_SHAPE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";

const INT_PATTERN: &str = r"^[+-]?[0-9]+$";

/// Category of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The value is empty
    Empty,
    /// The row is too short to contain the column
    Missing,
    /// The value does not have the expected shape
    InvalidFormat,
    /// The value is not one of the allowed values
    NotAllowed,
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Violation for a column the row does not have.
    pub fn missing(value_type: ValueType) -> Self {
        Self::new(
            ViolationKind::Missing,
            format!("expected type '{}' but the column is missing", value_type),
        )
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Field validator with its patterns compiled once.
#[derive(Debug, Clone)]
pub struct Validator {
    email: Regex,
    date_shape: Regex,
    int: Regex,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            email: Regex::new(EMAIL_PATTERN).expect("Invalid email pattern"),
            date_shape: Regex::new(DATE_SHAPE_PATTERN).expect("Invalid date pattern"),
            int: Regex::new(INT_PATTERN).expect("Invalid integer pattern"),
        }
    }

    /// Check a (post-transformation) value against a column rule.
    pub fn validate(&self, value: &str, rule: &FieldRule) -> Result<(), Violation> {
        let value_type = rule.value_type;

        if value.is_empty() {
            return Err(Violation::new(
                ViolationKind::Empty,
                format!("expected type '{}' but received an empty value", value_type),
            ));
        }

        match value_type {
            ValueType::Required => Ok(()),
            ValueType::Int => {
                if self.int.is_match(value) {
                    Ok(())
                } else {
                    Err(Violation::new(
                        ViolationKind::InvalidFormat,
                        format!("expected an integer but got '{}'", value),
                    ))
                }
            }
            ValueType::Float => {
                if is_decimal_float(value) {
                    Ok(())
                } else {
                    Err(Violation::new(
                        ViolationKind::InvalidFormat,
                        format!("expected a float, but got '{}'", value),
                    ))
                }
            }
            ValueType::Email => {
                if self.email.is_match(value) {
                    Ok(())
                } else {
                    Err(Violation::new(
                        ViolationKind::InvalidFormat,
                        format!("invalid email format: '{}'", value),
                    ))
                }
            }
            ValueType::Date => {
                let valid = self.date_shape.is_match(value)
                    && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok();
                if valid {
                    Ok(())
                } else {
                    Err(Violation::new(
                        ViolationKind::InvalidFormat,
                        format!("invalid date format (expected YYYY-MM-DD) but got '{}'", value),
                    ))
                }
            }
            ValueType::Equals => {
                if rule.expected_values.iter().any(|v| v == value) {
                    Ok(())
                } else {
                    Err(Violation::new(
                        ViolationKind::NotAllowed,
                        format!(
                            "value '{}' does not match allowed options: {}",
                            value,
                            rule.expected_values.join(", ")
                        ),
                    ))
                }
            }
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Decimal floats only: `inf`/`NaN` spellings accepted by `f64::from_str`
/// are rejected.
fn is_decimal_float(value: &str) -> bool {
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    let only_numeric = value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E'));
    has_digit && only_numeric && value.parse::<f64>().is_ok()
}
