//! Shared types for the brickstash catalog subsystem.
//!
//! These are the domain records produced by the LCX parser, persisted by the
//! catalog store, and returned through the service's query surface, along
//! with the tagged progress-event protocol emitted during catalog loads.
//! Field names serialize in camelCase to match the LCX-Tabular wire format.

use serde::{Deserialize, Serialize};

/// A BrickLink part category.
///
/// Replaced wholesale on each catalog reload; identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: u32,
    pub name: String,
}

/// A BrickLink color, including its popularity counters.
///
/// `rgb` is a validated 6-hex-digit uppercase string, or `None` when the
/// source value did not survive validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Color {
    pub id: u32,
    pub name: String,
    pub rgb: Option<String>,
    #[serde(rename = "type")]
    pub color_type: String,
    pub parts: u32,
    pub in_sets: u32,
    pub wanted: u32,
    pub for_sale: u32,
    pub year_from: Option<u32>,
    pub year_to: Option<u32>,
}

/// A BrickLink part. Identity is `bl_id`; `part_id` mirrors it for
/// compatibility with lookup APIs keyed on `partId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub bl_id: String,
    pub part_id: String,
    pub name: String,
    pub cat_id: u32,
    pub alt: Option<Vec<String>>,
}

/// Association record: a part is known in a color, and whether catalog
/// imagery exists for that combination. Composite identity is
/// `(part_id, color_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartColor {
    pub part_id: String,
    pub color_id: u32,
    pub has_img: bool,
}

/// Provenance of a parsed LCX catalog, cached in store metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMetadata {
    pub source: String,
    pub version: String,
    pub schema_version: u64,
    pub parsed_at: String,
}

/// The `lastUpdate` metadata record, used for the freshness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUpdate {
    /// Epoch milliseconds of the load that wrote this record.
    pub timestamp: i64,
    pub source: String,
    pub version: String,
}

/// Per-collection row counts plus catalog provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub categories: u64,
    pub colors: u64,
    pub parts: u64,
    pub part_colors: u64,
    pub source: Option<String>,
    pub version: Option<String>,
    pub parsed_at: Option<String>,
    pub last_update: Option<LastUpdate>,
}

/// A part search result, shaped for autocomplete consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartHit {
    pub value: String,
    pub label: String,
    pub category: String,
    pub data: Part,
}

/// A color search result, shaped for autocomplete consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorHit {
    pub value: String,
    pub label: String,
    pub rgb: Option<String>,
    #[serde(rename = "type")]
    pub color_type: String,
    pub data: Color,
}

/// The pipeline stages reported during a catalog load, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadStep {
    InitStore,
    Download,
    Decompress,
    Parse,
    SaveCategories,
    SaveColors,
    SaveParts,
    SavePartColors,
    Finalize,
}

impl LoadStep {
    /// Zero-based position of the step within the pipeline.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// A progress notification emitted during [`LoadStep`]s of a catalog load.
///
/// `Error` and `Done` are terminal: exactly one of them ends every load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LoadEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        step: LoadStep,
        percent: u8,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Error { message: String },
    #[serde(rename_all = "camelCase")]
    Done { stats: CatalogStats },
}
