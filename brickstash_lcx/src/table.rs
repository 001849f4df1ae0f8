//! Columnar table codec.
//!
//! LCX tables ship as `{cols: [...], rows: [[...], ...]}`; each row maps
//! positionally onto `cols`. Decoding produces one JSON object per row,
//! encoding is the inverse with `null` substituted for missing fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::LcxError;

/// One columnar table from an LCX envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub cols: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// A decoded row: field name to raw JSON value.
pub type Record = Map<String, Value>;

/// Decode a columnar table into per-row records.
///
/// Every row must have exactly `cols.len()` values; a mismatch fails with
/// [`LcxError::MalformedTable`] naming the table and the offending row index.
pub fn decode(name: &str, table: &Table) -> Result<Vec<Record>, LcxError> {
    let mut records = Vec::with_capacity(table.rows.len());
    for (row_index, row) in table.rows.iter().enumerate() {
        if row.len() != table.cols.len() {
            return Err(LcxError::malformed(
                name,
                format!(
                    "row {row_index} has {} values, expected {}",
                    row.len(),
                    table.cols.len()
                ),
            ));
        }
        let mut record = Record::new();
        for (col, value) in table.cols.iter().zip(row) {
            record.insert(col.clone(), value.clone());
        }
        records.push(record);
    }
    Ok(records)
}

/// Encode records back into a columnar table over the given column list.
///
/// Fields absent from a record are written as JSON `null`.
pub fn encode(records: &[Record], cols: &[String]) -> Table {
    let rows = records
        .iter()
        .map(|record| {
            cols.iter()
                .map(|col| record.get(col).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    Table {
        cols: cols.to_vec(),
        rows,
    }
}
