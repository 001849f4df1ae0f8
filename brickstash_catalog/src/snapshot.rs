//! Versioned persisted form of the catalog store.
//!
//! The store serializes through snapshot DTOs rather than its in-memory
//! representation, so the persisted format can evolve independently.
//! Version 1 predates the partColors collection; loading a v1 snapshot
//! migrates it additively (existing collections untouched, the new one
//! empty) and the store is re-persisted at the current version.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use brickstash_types::{Category, Color, Part, PartColor};

use crate::store::InnerStore;

/// Version written by this build.
pub(crate) const SNAPSHOT_SCHEMA_VERSION: u64 = 2;

pub(crate) trait Snapshot {
    type Serialized;

    fn snapshot(&self) -> Self::Serialized;
    fn from_snapshot(snap: Self::Serialized) -> Self;
}

/// Current snapshot layout.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoreSnapshotV2 {
    pub(crate) schema_version: u64,
    pub(crate) categories: Vec<Category>,
    pub(crate) colors: Vec<Color>,
    pub(crate) parts: Vec<Part>,
    #[serde(default)]
    pub(crate) part_colors: Vec<PartColor>,
    #[serde(default)]
    pub(crate) metadata: BTreeMap<String, serde_json::Value>,
}

/// Snapshot layout before the partColors collection existed.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoreSnapshotV1 {
    #[allow(dead_code)]
    pub(crate) schema_version: u64,
    pub(crate) categories: Vec<Category>,
    pub(crate) colors: Vec<Color>,
    pub(crate) parts: Vec<Part>,
    #[serde(default)]
    pub(crate) metadata: BTreeMap<String, serde_json::Value>,
}

impl From<StoreSnapshotV1> for StoreSnapshotV2 {
    fn from(snap: StoreSnapshotV1) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            categories: snap.categories,
            colors: snap.colors,
            parts: snap.parts,
            part_colors: Vec::new(),
            metadata: snap.metadata,
        }
    }
}

impl Snapshot for InnerStore {
    type Serialized = StoreSnapshotV2;

    fn snapshot(&self) -> Self::Serialized {
        StoreSnapshotV2 {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            categories: self.categories.values().cloned().collect(),
            colors: self.colors.values().cloned().collect(),
            parts: self.parts.values().cloned().collect(),
            part_colors: self.part_colors.values().cloned().collect(),
            metadata: self.metadata.clone(),
        }
    }

    /// Rebuilds secondary indexes from the primary data as it loads.
    fn from_snapshot(snap: Self::Serialized) -> Self {
        let mut inner = Self::default();
        for category in snap.categories {
            inner.put_category(category);
        }
        for color in snap.colors {
            inner.put_color(color);
        }
        for part in snap.parts {
            inner.put_part(part);
        }
        for part_color in snap.part_colors {
            inner.put_part_color(part_color);
        }
        inner.metadata = snap.metadata;
        inner
    }
}
