//! The versioned, indexed catalog store.
//!
//! Collections live in memory behind a [`RwLock`] and persist as a
//! versioned snapshot in an injectable [`ObjectStore`]. Reads are
//! synchronous; anything that mutates persists a fresh snapshot before
//! returning. A whole collection is only ever replaced wholesale
//! ([`CatalogStore::bulk_replace`]), never updated record by record.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use object_store::ObjectStore;
use object_store::path::Path;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use brickstash_types::{
    CatalogMetadata, CatalogStats, Category, Color, ColorHit, LastUpdate, Part, PartColor, PartHit,
};

use crate::serialize;
use crate::snapshot::Snapshot;

/// Records per write batch during [`CatalogStore::bulk_replace`].
pub const BULK_BATCH_SIZE: usize = 500;

/// Metadata key carrying the [`LastUpdate`] record.
pub const LAST_UPDATE_KEY: &str = "lastUpdate";

/// Metadata key caching the provenance of the last parsed LCX catalog.
pub const LCX_METADATA_KEY: &str = "lcxMetadata";

/// Object-store location of the persisted snapshot.
pub(crate) const SNAPSHOT_PATH: &str = "brickstash/catalog.snapshot";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store error: {0:?}")]
    ObjectStore(#[from] object_store::Error),

    #[error("failed to serialize catalog snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unexpected error: {0:?}")]
    Unexpected(#[from] anyhow::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// The catalog collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Categories,
    Colors,
    Parts,
    PartColors,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Colors => "colors",
            Self::Parts => "parts",
            Self::PartColors => "partColors",
        }
    }
}

/// A record rejected during a bulk write; logged and skipped, never fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvalidRecord(String);

/// A typed record belonging to one of the catalog collections.
pub trait CatalogRecord: Send + Sync + std::fmt::Debug {
    const COLLECTION: Collection;

    /// Reject records whose primary key would be unusable.
    fn validate(&self) -> Result<(), InvalidRecord>;

    /// Upsert into the in-memory state, maintaining secondary indexes.
    fn store_into(self, inner: &mut InnerStore);
}

impl CatalogRecord for Category {
    const COLLECTION: Collection = Collection::Categories;

    fn validate(&self) -> Result<(), InvalidRecord> {
        Ok(())
    }

    fn store_into(self, inner: &mut InnerStore) {
        inner.put_category(self);
    }
}

impl CatalogRecord for Color {
    const COLLECTION: Collection = Collection::Colors;

    fn validate(&self) -> Result<(), InvalidRecord> {
        Ok(())
    }

    fn store_into(self, inner: &mut InnerStore) {
        inner.put_color(self);
    }
}

impl CatalogRecord for Part {
    const COLLECTION: Collection = Collection::Parts;

    fn validate(&self) -> Result<(), InvalidRecord> {
        if self.bl_id.is_empty() {
            return Err(InvalidRecord(format!(
                "part \"{}\" has an empty blId",
                self.name
            )));
        }
        Ok(())
    }

    fn store_into(self, inner: &mut InnerStore) {
        inner.put_part(self);
    }
}

impl CatalogRecord for PartColor {
    const COLLECTION: Collection = Collection::PartColors;

    fn validate(&self) -> Result<(), InvalidRecord> {
        if self.part_id.is_empty() {
            return Err(InvalidRecord(format!(
                "part-color link for color {} has an empty partId",
                self.color_id
            )));
        }
        Ok(())
    }

    fn store_into(self, inner: &mut InnerStore) {
        inner.put_part_color(self);
    }
}

/// In-memory state: primary collections plus the secondary indexes the
/// query surface depends on. Only mutated through the `put_*`/`clear`
/// methods so the indexes can never drift from the primary data.
#[derive(Debug, Default)]
pub struct InnerStore {
    pub(crate) categories: BTreeMap<u32, Category>,
    pub(crate) colors: BTreeMap<u32, Color>,
    pub(crate) parts: BTreeMap<String, Part>,
    pub(crate) part_colors: BTreeMap<(String, u32), PartColor>,
    pub(crate) metadata: BTreeMap<String, serde_json::Value>,
    /// Exact-name lookup for colors.
    color_names: HashMap<String, u32>,
    /// `(parts count, id)` pairs; reverse iteration gives popularity order.
    colors_by_parts: BTreeSet<(u32, u32)>,
}

impl InnerStore {
    pub(crate) fn put_category(&mut self, category: Category) {
        self.categories.insert(category.id, category);
    }

    pub(crate) fn put_color(&mut self, color: Color) {
        if let Some(old) = self.colors.get(&color.id) {
            self.color_names.remove(&old.name);
            self.colors_by_parts.remove(&(old.parts, old.id));
        }
        self.color_names.insert(color.name.clone(), color.id);
        self.colors_by_parts.insert((color.parts, color.id));
        self.colors.insert(color.id, color);
    }

    pub(crate) fn put_part(&mut self, part: Part) {
        self.parts.insert(part.bl_id.clone(), part);
    }

    pub(crate) fn put_part_color(&mut self, part_color: PartColor) {
        self.part_colors.insert(
            (part_color.part_id.clone(), part_color.color_id),
            part_color,
        );
    }

    pub(crate) fn clear(&mut self, collection: Collection) {
        match collection {
            Collection::Categories => self.categories.clear(),
            Collection::Colors => {
                self.colors.clear();
                self.color_names.clear();
                self.colors_by_parts.clear();
            }
            Collection::Parts => self.parts.clear(),
            Collection::PartColors => self.part_colors.clear(),
        }
    }

    fn count(&self, collection: Collection) -> u64 {
        let len = match collection {
            Collection::Categories => self.categories.len(),
            Collection::Colors => self.colors.len(),
            Collection::Parts => self.parts.len(),
            Collection::PartColors => self.part_colors.len(),
        };
        len as u64
    }
}

/// The versioned, indexed catalog store.
#[derive(Debug)]
pub struct CatalogStore {
    object_store: Arc<dyn ObjectStore>,
    snapshot_path: Path,
    inner: RwLock<InnerStore>,
}

impl CatalogStore {
    /// Open the store, loading the persisted snapshot when one exists and
    /// migrating older snapshot versions additively.
    pub async fn open(object_store: Arc<dyn ObjectStore>) -> Result<Arc<Self>> {
        let snapshot_path = Path::from(SNAPSHOT_PATH);
        let (inner, migrated) = match serialize::load_snapshot(&object_store, &snapshot_path).await?
        {
            Some((snapshot, migrated)) => (InnerStore::from_snapshot(snapshot), migrated),
            None => (InnerStore::default(), false),
        };
        info!(
            categories = inner.categories.len(),
            colors = inner.colors.len(),
            parts = inner.parts.len(),
            part_colors = inner.part_colors.len(),
            "opened catalog store"
        );

        let store = Arc::new(Self {
            object_store,
            snapshot_path,
            inner: RwLock::new(inner),
        });
        if migrated {
            store.persist().await?;
        }
        Ok(store)
    }

    /// Clear the record's collection, then write all records in sequential
    /// batches of [`BULK_BATCH_SIZE`] as idempotent upserts.
    ///
    /// `report` receives `(percent, message)` per batch, the percent
    /// rounded and capped at 100. A record that fails validation is logged
    /// and skipped rather than aborting the batch. Returns the number of
    /// records written.
    pub async fn bulk_replace<R, F>(&self, mut records: Vec<R>, report: F) -> Result<u64>
    where
        R: CatalogRecord,
        F: Fn(u8, &str) + Send + Sync,
    {
        let total = records.len();
        self.inner.write().clear(R::COLLECTION);
        if total == 0 {
            report(100, "no records to save");
            self.persist().await?;
            return Ok(0);
        }

        let mut processed = 0usize;
        let mut written = 0u64;
        while !records.is_empty() {
            let take = records.len().min(BULK_BATCH_SIZE);
            let batch: Vec<R> = records.drain(..take).collect();
            {
                let mut inner = self.inner.write();
                for record in batch {
                    match record.validate() {
                        Ok(()) => {
                            record.store_into(&mut inner);
                            written += 1;
                        }
                        Err(reason) => {
                            warn!(
                                collection = R::COLLECTION.name(),
                                %reason,
                                "skipping record that failed to save"
                            );
                        }
                    }
                }
            }
            processed += take;
            let percent = ((processed * 100 + total / 2) / total).min(100) as u8;
            report(percent, &format!("Saved {processed} of {total} records"));
            tokio::task::yield_now().await;
        }

        self.persist().await?;
        debug!(
            collection = R::COLLECTION.name(),
            written,
            skipped = total as u64 - written,
            "bulk replace complete"
        );
        Ok(written)
    }

    /// Clear all four catalog collections. Metadata is left alone.
    pub async fn clear_catalog(&self) -> Result<()> {
        {
            let mut inner = self.inner.write();
            inner.clear(Collection::Categories);
            inner.clear(Collection::Colors);
            inner.clear(Collection::Parts);
            inner.clear(Collection::PartColors);
        }
        self.persist().await
    }

    /// Parts whose id, name, or category name contains `query`
    /// (case-insensitive), at most `limit`. Queries shorter than two
    /// characters return empty without touching the collections.
    pub fn search_parts(&self, query: &str, limit: usize) -> Vec<PartHit> {
        if query.chars().count() < 2 {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        let inner = self.inner.read();
        let mut hits = Vec::new();
        for part in inner.parts.values() {
            if hits.len() >= limit {
                break;
            }
            let category_name = inner
                .categories
                .get(&part.cat_id)
                .map_or("Unknown", |category| category.name.as_str());
            let matches = part.bl_id.to_lowercase().contains(&needle)
                || part.part_id.to_lowercase().contains(&needle)
                || part.name.to_lowercase().contains(&needle)
                || category_name.to_lowercase().contains(&needle);
            if matches {
                hits.push(PartHit {
                    value: part.part_id.clone(),
                    label: format!("{} - {}", part.bl_id, part.name),
                    category: category_name.to_string(),
                    data: part.clone(),
                });
            }
        }
        hits
    }

    /// Colors whose name, id, or type contains `query` (case-insensitive)
    /// in id order; an empty query returns the most popular colors instead.
    pub fn search_colors(&self, query: &str, limit: usize) -> Vec<ColorHit> {
        if query.is_empty() {
            return self.popular_colors(limit);
        }
        let needle = query.to_lowercase();
        let inner = self.inner.read();
        inner
            .colors
            .values()
            .filter(|color| {
                color.name.to_lowercase().contains(&needle)
                    || color.id.to_string().contains(&needle)
                    || color.color_type.to_lowercase().contains(&needle)
            })
            .take(limit)
            .map(color_hit)
            .collect()
    }

    /// The `limit` colors with the highest parts count, descending.
    pub fn popular_colors(&self, limit: usize) -> Vec<ColorHit> {
        let inner = self.inner.read();
        inner
            .colors_by_parts
            .iter()
            .rev()
            .take(limit)
            .filter_map(|(_, id)| inner.colors.get(id))
            .map(color_hit)
            .collect()
    }

    pub fn part_by_id(&self, bl_id: &str) -> Option<Part> {
        self.inner.read().parts.get(bl_id).cloned()
    }

    pub fn color_by_name(&self, name: &str) -> Option<Color> {
        let inner = self.inner.read();
        let id = inner.color_names.get(name)?;
        inner.colors.get(id).cloned()
    }

    pub fn color_by_id(&self, id: u32) -> Option<Color> {
        self.inner.read().colors.get(&id).cloned()
    }

    pub fn category_by_id(&self, id: u32) -> Option<Category> {
        self.inner.read().categories.get(&id).cloned()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.inner.read().categories.values().cloned().collect()
    }

    /// Color-variant records for a part, empty when none are known.
    pub fn part_colors(&self, part_id: &str) -> Vec<PartColor> {
        let inner = self.inner.read();
        inner
            .part_colors
            .range((part_id.to_string(), u32::MIN)..=(part_id.to_string(), u32::MAX))
            .map(|(_, part_color)| part_color.clone())
            .collect()
    }

    pub fn count(&self, collection: Collection) -> u64 {
        self.inner.read().count(collection)
    }

    /// True iff both `parts` and `colors` are non-empty; distinguishes
    /// "never loaded" from "loaded but cleared".
    pub fn has_existing_data(&self) -> bool {
        let inner = self.inner.read();
        !inner.parts.is_empty() && !inner.colors.is_empty()
    }

    /// Per-collection counts plus stored provenance metadata.
    pub fn stats(&self) -> CatalogStats {
        let inner = self.inner.read();
        let lcx_metadata: Option<CatalogMetadata> = inner
            .metadata
            .get(LCX_METADATA_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok());
        CatalogStats {
            categories: inner.count(Collection::Categories),
            colors: inner.count(Collection::Colors),
            parts: inner.count(Collection::Parts),
            part_colors: inner.count(Collection::PartColors),
            source: lcx_metadata.as_ref().map(|m| m.source.clone()),
            version: lcx_metadata.as_ref().map(|m| m.version.clone()),
            parsed_at: lcx_metadata.map(|m| m.parsed_at),
            last_update: inner
                .metadata
                .get(LAST_UPDATE_KEY)
                .and_then(|value| serde_json::from_value(value.clone()).ok()),
        }
    }

    pub fn metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.read().metadata.get(key).cloned()
    }

    pub fn last_update(&self) -> Option<LastUpdate> {
        self.metadata(LAST_UPDATE_KEY)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn lcx_metadata(&self) -> Option<CatalogMetadata> {
        self.metadata(LCX_METADATA_KEY)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub async fn set_metadata(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.inner.write().metadata.insert(key.to_string(), value);
        self.persist().await
    }

    pub async fn delete_metadata(&self, key: &str) -> Result<()> {
        self.inner.write().metadata.remove(key);
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        let snapshot = {
            let inner = self.inner.read();
            inner.snapshot()
        };
        serialize::persist_snapshot(&self.object_store, &self.snapshot_path, &snapshot).await
    }
}

fn color_hit(color: &Color) -> ColorHit {
    ColorHit {
        value: color.name.clone(),
        label: color.name.clone(),
        rgb: color.rgb.clone(),
        color_type: color.color_type.clone(),
        data: color.clone(),
    }
}
