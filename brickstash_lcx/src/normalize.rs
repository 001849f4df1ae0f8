//! Pure per-entity normalization of decoded LCX records.
//!
//! Decoded rows carry raw JSON values; these functions coerce them into the
//! typed records the store persists. They never fail: unparseable counters
//! default to zero, invalid RGB values become `None` (with a warning), and
//! malformed `alt` lists collapse to `None`, matching the tolerant ingestion
//! behavior of the catalog producer.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use brickstash_types::{Category, Color, Part, PartColor};

use crate::table::Record;

static RGB_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[0-9A-F]{6}$").expect("valid RGB regex"));

pub fn category(record: &Record) -> Category {
    Category {
        id: int_or_zero(record.get("id")),
        name: trimmed(record.get("name")),
    }
}

pub fn color(record: &Record) -> Color {
    let name = trimmed(record.get("name"));
    Color {
        id: int_or_zero(record.get("id")),
        rgb: rgb(record.get("rgb"), &name),
        color_type: trimmed(record.get("type")),
        parts: int_or_zero(record.get("parts")),
        in_sets: int_or_zero(record.get("inSets")),
        wanted: int_or_zero(record.get("wanted")),
        for_sale: int_or_zero(record.get("forSale")),
        year_from: opt_int(record.get("yearFrom")),
        year_to: opt_int(record.get("yearTo")),
        name,
    }
}

pub fn part(record: &Record) -> Part {
    let bl_id = trimmed(record.get("blId"));
    Part {
        part_id: bl_id.clone(),
        name: trimmed(record.get("name")),
        cat_id: int_or_zero(record.get("catId")),
        alt: alt_ids(record.get("alt")),
        bl_id,
    }
}

pub fn part_color(record: &Record) -> PartColor {
    PartColor {
        part_id: trimmed(record.get("partId")),
        color_id: int_or_zero(record.get("colorId")),
        has_img: truthy(record.get("hasImg")),
    }
}

/// Uppercase and validate a 6-hex-digit RGB value; anything else is `None`.
pub fn rgb(value: Option<&Value>, color_name: &str) -> Option<String> {
    let raw = match value {
        None | Some(Value::Null) => return None,
        Some(v) => scalar_string(v),
    };
    let candidate = raw.to_uppercase();
    if RGB_PATTERN.is_match(&candidate) {
        Some(candidate)
    } else {
        warn!(color = color_name, rgb = raw.as_str(), "invalid RGB value, storing null");
        None
    }
}

/// An `alt` value is kept only when it is an array; entries are trimmed and
/// empties dropped. Any other shape becomes `None`.
pub fn alt_ids(value: Option<&Value>) -> Option<Vec<String>> {
    match value {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|item| scalar_string(item).trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        ),
        _ => None,
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn trimmed(value: Option<&Value>) -> String {
    value
        .map(scalar_string)
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn int_or_zero(value: Option<&Value>) -> u32 {
    opt_int(value).unwrap_or(0)
}

fn opt_int(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// JavaScript-style truthiness, used for the `hasImg` flag.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
