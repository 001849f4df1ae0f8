//! The LCX-Tabular catalog interchange format.
//!
//! LCX-Tabular v1 is a columnar JSON document (optionally gzip-compressed)
//! distributing the BrickLink categories/colors/parts/partColors dataset in
//! bulk. This crate is pure data transformation with no I/O beyond
//! decompressing an in-memory buffer:
//!
//! - [`table`] converts between the columnar `{cols, rows}` representation
//!   and per-row record maps
//! - [`schema`] validates a raw JSON envelope against the v1 table schemas
//! - [`normalize`] turns decoded record maps into typed, cleaned records
//! - [`parser`] ties the above together and produces a [`ParsedCatalog`]
//! - [`legacy`] handles the older tab-separated distribution used as a
//!   fallback when an LCX archive cannot be loaded
//!
//! [`ParsedCatalog`]: parser::ParsedCatalog

use thiserror::Error;

pub mod legacy;
pub mod normalize;
pub mod parser;
pub mod schema;
pub mod table;

/// Validation failures for an LCX-Tabular envelope or one of its tables.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LcxError {
    #[error(
        "unsupported schema version {found:?}, supported: {}",
        schema::SUPPORTED_SCHEMA_VERSION
    )]
    UnsupportedSchema { found: Option<i64> },

    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("missing required table `{table}`")]
    MissingTable { table: String },

    #[error("table `{table}` is malformed: {reason}")]
    MalformedTable { table: String, reason: String },

    #[error("table `{table}` has unexpected columns: expected [{expected}], found [{found}]")]
    SchemaMismatch {
        table: String,
        expected: String,
        found: String,
    },
}

impl LcxError {
    pub(crate) fn malformed(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTable {
            table: table.into(),
            reason: reason.into(),
        }
    }
}
