//! Legacy tab-separated catalog tables, used as the fallback when an
//! LCX archive cannot be fetched or fails validation.
//!
//! Both files carry a 3-line human-readable header followed by positional
//! tab-separated columns:
//!
//! - parts: `categoryId  categoryName  partId  name  [alternateId]`
//! - colors: `id  name  rgb  type  partsCount`
//!
//! Rows in the `Sticker Sheet` or `Homemaker` categories, and rows missing
//! an id or name, are dropped. Color rows named `(Not Applicable)` or
//! lacking an RGB value are dropped. Category records are derived from the
//! distinct `(categoryId, categoryName)` pairs of the surviving part rows.

use std::collections::BTreeMap;

use tracing::debug;

use brickstash_types::{Category, Color, Part};

use crate::normalize;

/// Number of header lines preceding data rows in both legacy files.
const HEADER_LINES: usize = 3;

/// Part categories excluded from ingestion.
const DROPPED_CATEGORIES: &[&str] = &["Sticker Sheet", "Homemaker"];

/// The dataset recoverable from the legacy tables. `partColors` has no
/// legacy equivalent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyCatalog {
    pub categories: Vec<Category>,
    pub colors: Vec<Color>,
    pub parts: Vec<Part>,
}

/// Parse both legacy tables into a catalog dataset.
pub fn parse(parts_text: &str, colors_text: &str) -> LegacyCatalog {
    let (parts, categories) = parse_parts(parts_text);
    let colors = parse_colors(colors_text);
    debug!(
        categories = categories.len(),
        colors = colors.len(),
        parts = parts.len(),
        "parsed legacy catalog tables"
    );
    LegacyCatalog {
        categories,
        colors,
        parts,
    }
}

/// Parse the legacy parts table, deriving category records from the
/// distinct category columns as a side product.
pub fn parse_parts(text: &str) -> (Vec<Part>, Vec<Category>) {
    let mut parts = Vec::new();
    let mut categories: BTreeMap<u32, String> = BTreeMap::new();

    for line in text.lines().skip(HEADER_LINES) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            continue;
        }
        let category_name = fields[1].trim();
        if DROPPED_CATEGORIES.contains(&category_name) {
            continue;
        }
        let part_id = fields[2].trim();
        let name = fields[3].trim();
        if part_id.is_empty() || name.is_empty() {
            continue;
        }
        let cat_id: u32 = match fields[0].trim().parse() {
            Ok(id) => id,
            Err(_) => continue,
        };
        let alt = fields
            .get(4)
            .map(|alt| alt.trim())
            .filter(|alt| !alt.is_empty())
            .map(|alt| vec![alt.to_string()]);

        if !category_name.is_empty() {
            categories
                .entry(cat_id)
                .or_insert_with(|| category_name.to_string());
        }
        parts.push(Part {
            bl_id: part_id.to_string(),
            part_id: part_id.to_string(),
            name: name.to_string(),
            cat_id,
            alt,
        });
    }

    let categories = categories
        .into_iter()
        .map(|(id, name)| Category { id, name })
        .collect();
    (parts, categories)
}

/// Parse the legacy colors table. Fields the legacy format does not carry
/// (set/wanted/sale counters, year range) are stored as zero or `None`.
pub fn parse_colors(text: &str) -> Vec<Color> {
    let mut colors = Vec::new();

    for line in text.lines().skip(HEADER_LINES) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            continue;
        }
        let name = fields[1].trim();
        let raw_rgb = fields[2].trim();
        if name.is_empty() || name == "(Not Applicable)" || raw_rgb.is_empty() {
            continue;
        }
        let id: u32 = match fields[0].trim().parse() {
            Ok(id) => id,
            Err(_) => continue,
        };
        colors.push(Color {
            id,
            name: name.to_string(),
            rgb: normalize::rgb(Some(&serde_json::Value::String(raw_rgb.to_string())), name),
            color_type: fields[3].trim().to_string(),
            parts: fields[4].trim().parse().unwrap_or(0),
            in_sets: 0,
            wanted: 0,
            for_sale: 0,
            year_from: None,
            year_to: None,
        });
    }

    colors
}
