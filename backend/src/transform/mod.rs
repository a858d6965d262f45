//! Transformation module.
//!
//! - [`operations`]: the closed set of column operations and chain execution
//! - [`transform_row`]: applies every rule's chain to one data row
//!
//! Rules are applied in ascending column order on the row being rewritten.
//! A `concat` that reads a lower-indexed column therefore sees that column's
//! transformed value, while a higher-indexed column is still original.
//! Schema authors who concatenate across columns should rely on this order.

pub mod operations;
pub mod pipeline;
pub mod report;

pub use operations::{apply_chain, operations_description, Transformation};

use crate::schema::Schema;

/// Rewrite a data row in place according to the schema.
///
/// Columns without a rule, and rules pointing past the end of a short row,
/// are left as they are.
pub fn transform_row(row: &mut [String], schema: &Schema) {
    for (index, rule) in schema.iter() {
        apply_chain(&rule.transformations, row, index);
    }
}
