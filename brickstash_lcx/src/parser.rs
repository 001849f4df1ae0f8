//! LCX-Tabular catalog parsing.
//!
//! Orchestrates the full transformation of an LCX document: optional gzip
//! decompression (detected by file-name suffix), JSON deserialization,
//! envelope validation, columnar decoding, and per-entity normalization.

use std::io::Read;

use chrono::Utc;
use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::debug;

use brickstash_types::{CatalogMetadata, CatalogStats, Category, Color, Part, PartColor};

use crate::{LcxError, normalize, schema, table};

/// File-name suffixes recognized as LCX-Tabular documents.
const LCX_SUFFIXES: &[&str] = &[".lcx.json", ".lcx.json.gz", ".lctx.json", ".lctx.json.gz"];

/// Failure to turn raw catalog input into a [`ParsedCatalog`].
///
/// Each variant carries its underlying cause; the rendered message always
/// includes the original error text.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog validation failed: {0}")]
    Validation(#[from] LcxError),

    #[error("failed to decompress catalog archive: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("catalog text is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// A fully normalized in-memory catalog dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCatalog {
    pub metadata: CatalogMetadata,
    pub categories: Vec<Category>,
    pub colors: Vec<Color>,
    pub parts: Vec<Part>,
    pub part_colors: Option<Vec<PartColor>>,
}

impl ParsedCatalog {
    /// Summary counts plus provenance, for logging and progress reporting.
    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            categories: self.categories.len() as u64,
            colors: self.colors.len() as u64,
            parts: self.parts.len() as u64,
            part_colors: self.part_colors.as_ref().map_or(0, |pcs| pcs.len() as u64),
            source: Some(self.metadata.source.clone()),
            version: Some(self.metadata.version.clone()),
            parsed_at: Some(self.metadata.parsed_at.clone()),
            last_update: None,
        }
    }
}

/// Whether a file name is recognized as an LCX-Tabular document.
pub fn can_parse(name: &str) -> bool {
    let name = name.to_lowercase();
    LCX_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Parse an LCX document from raw bytes, decompressing first when the name
/// carries a `.gz` suffix.
pub fn parse_slice(name: &str, bytes: &[u8]) -> Result<ParsedCatalog, ParseError> {
    let text = if name.to_lowercase().ends_with(".gz") {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = String::new();
        decoder.read_to_string(&mut out)?;
        out
    } else {
        String::from_utf8(bytes.to_vec())?
    };
    parse_str(&text)
}

/// Parse an LCX document from its JSON text.
pub fn parse_str(text: &str) -> Result<ParsedCatalog, ParseError> {
    let doc: serde_json::Value = serde_json::from_str(text)?;
    let envelope = schema::validate(&doc)?;

    let categories = decode_entities(&envelope, "categories", normalize::category)?;
    let colors = decode_entities(&envelope, "colors", normalize::color)?;
    let parts = decode_entities(&envelope, "parts", normalize::part)?;
    let part_colors = match envelope.tables.get("partColors") {
        Some(_) => Some(decode_entities(&envelope, "partColors", normalize::part_color)?),
        None => None,
    };

    let metadata = CatalogMetadata {
        source: envelope.source,
        version: envelope.version,
        schema_version: envelope.schema_version as u64,
        parsed_at: Utc::now().to_rfc3339(),
    };
    debug!(
        categories = categories.len(),
        colors = colors.len(),
        parts = parts.len(),
        "parsed LCX catalog"
    );

    Ok(ParsedCatalog {
        metadata,
        categories,
        colors,
        parts,
        part_colors,
    })
}

fn decode_entities<T>(
    envelope: &schema::Envelope,
    name: &str,
    transform: fn(&table::Record) -> T,
) -> Result<Vec<T>, ParseError> {
    let Some(columnar) = envelope.tables.get(name) else {
        return Ok(Vec::new());
    };
    let records = table::decode(name, columnar)?;
    Ok(records.iter().map(transform).collect())
}
