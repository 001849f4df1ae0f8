//! Envelope and per-table schema validation for LCX-Tabular v1.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::LcxError;
use crate::table::Table;

/// The one schema version this build understands.
pub const SUPPORTED_SCHEMA_VERSION: i64 = 1;

/// Tables that must be present in every envelope.
pub const REQUIRED_TABLES: &[&str] = &["categories", "colors", "parts"];

/// Tables that are validated only when present.
pub const OPTIONAL_TABLES: &[&str] = &["partColors"];

/// Expected column list for a known table name, order-sensitive.
///
/// Unknown table names return `None` and are ignored by validation, so newer
/// producers can add tables without breaking older consumers.
pub fn expected_columns(table: &str) -> Option<&'static [&'static str]> {
    match table {
        "categories" => Some(&["id", "name"]),
        "colors" => Some(&[
            "id", "name", "rgb", "type", "parts", "inSets", "wanted", "forSale", "yearFrom",
            "yearTo",
        ]),
        "parts" => Some(&["blId", "name", "catId", "alt"]),
        "partColors" => Some(&["partId", "colorId", "hasImg"]),
        _ => None,
    }
}

/// A validated LCX envelope with its known tables in columnar form.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub source: String,
    pub version: String,
    pub schema_version: i64,
    pub tables: BTreeMap<String, Table>,
}

/// Validate a raw JSON document as an LCX-Tabular v1 envelope.
///
/// Checks, in order: supported `schemaVersion`, presence of `source`,
/// `version` and `tables`, presence of every required table, and for each
/// present known table its `{cols, rows}` shape, per-row length, and exact
/// column list.
pub fn validate(doc: &Value) -> Result<Envelope, LcxError> {
    let root = doc
        .as_object()
        .ok_or(LcxError::UnsupportedSchema { found: None })?;

    let schema_version = root.get("schemaVersion").and_then(Value::as_i64);
    if schema_version != Some(SUPPORTED_SCHEMA_VERSION) {
        return Err(LcxError::UnsupportedSchema {
            found: schema_version,
        });
    }
    let schema_version = SUPPORTED_SCHEMA_VERSION;

    let source = non_empty_str(root.get("source")).ok_or(LcxError::MissingField {
        field: "source",
    })?;
    let version = non_empty_str(root.get("version")).ok_or(LcxError::MissingField {
        field: "version",
    })?;
    let raw_tables = root
        .get("tables")
        .and_then(Value::as_object)
        .ok_or(LcxError::MissingField { field: "tables" })?;

    let mut tables = BTreeMap::new();
    for name in REQUIRED_TABLES {
        let raw = raw_tables.get(*name).ok_or_else(|| LcxError::MissingTable {
            table: (*name).to_string(),
        })?;
        tables.insert((*name).to_string(), validate_table(name, raw)?);
    }
    for name in OPTIONAL_TABLES {
        if let Some(raw) = raw_tables.get(*name) {
            tables.insert((*name).to_string(), validate_table(name, raw)?);
        }
    }

    Ok(Envelope {
        source: source.to_string(),
        version: version.to_string(),
        schema_version,
        tables,
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn validate_table(name: &str, raw: &Value) -> Result<Table, LcxError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| LcxError::malformed(name, "table is not an object"))?;

    let cols_value = obj
        .get("cols")
        .and_then(Value::as_array)
        .ok_or_else(|| LcxError::malformed(name, "`cols` is missing or not an array"))?;
    let mut cols = Vec::with_capacity(cols_value.len());
    for col in cols_value {
        let col = col
            .as_str()
            .ok_or_else(|| LcxError::malformed(name, "`cols` contains a non-string entry"))?;
        cols.push(col.to_string());
    }

    let rows_value = obj
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(|| LcxError::malformed(name, "`rows` is missing or not an array"))?;
    let mut rows = Vec::with_capacity(rows_value.len());
    for (row_index, row) in rows_value.iter().enumerate() {
        let row = row
            .as_array()
            .ok_or_else(|| LcxError::malformed(name, format!("row {row_index} is not an array")))?;
        if row.len() != cols.len() {
            return Err(LcxError::malformed(
                name,
                format!(
                    "row {row_index} has {} values, expected {}",
                    row.len(),
                    cols.len()
                ),
            ));
        }
        rows.push(row.clone());
    }

    if let Some(expected) = expected_columns(name) {
        if cols.len() != expected.len() || cols.iter().zip(expected).any(|(a, b)| a != b) {
            return Err(LcxError::SchemaMismatch {
                table: name.to_string(),
                expected: expected.join(", "),
                found: cols.join(", "),
            });
        }
    }

    Ok(Table { cols, rows })
}
