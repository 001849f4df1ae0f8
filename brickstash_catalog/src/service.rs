//! The catalog service: load orchestration and the query surface.
//!
//! [`CatalogService`] owns the decision of whether previously stored data
//! can be adopted, runs the load pipeline (download → decompress → parse →
//! bulk persist) with tagged progress events and cooperative cancellation,
//! and falls back to the legacy tabular tables when the LCX path fails.
//! UI collaborators only ever touch the query methods.

use std::sync::Arc;
use std::time::Duration;

use object_store::ObjectStore;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use brickstash_client::{Transport, TransportError};
use brickstash_lcx::legacy;
use brickstash_lcx::parser::{self, ParseError, ParsedCatalog};
use brickstash_types::{
    CatalogStats, Category, Color, ColorHit, LastUpdate, LoadEvent, LoadStep, Part, PartColor,
    PartHit,
};

use crate::store::{CatalogStore, LAST_UPDATE_KEY, LCX_METADATA_KEY, StoreError};
use crate::time::{SystemProvider, TimeProvider};

/// Maximum age of stored catalog data before a reload is attempted.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Default `limit` for part searches.
pub const DEFAULT_PART_SEARCH_LIMIT: usize = 50;

/// Default `limit` for color searches.
pub const DEFAULT_COLOR_SEARCH_LIMIT: usize = 20;

/// The `lastUpdate` source written by legacy fallback loads.
const LEGACY_SOURCE: &str = "legacy-tab";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog store error: {0}")]
    Store(#[from] StoreError),

    #[error("network error: {0}")]
    Network(#[source] TransportError),

    #[error("catalog parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("legacy catalog contained no usable rows")]
    EmptyLegacy,

    #[error("catalog load cancelled")]
    Cancelled,

    #[error("catalog load failed: {primary}; legacy fallback also failed: {fallback}")]
    LoadFailed {
        primary: Box<CatalogError>,
        fallback: Box<CatalogError>,
    },
}

impl From<TransportError> for CatalogError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => Self::Cancelled,
            other => Self::Network(other),
        }
    }
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

/// Where the catalog is fetched from and how long stored data stays fresh.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// URL of the LCX archive; a `.gz` suffix selects the decompress stage.
    pub archive_url: String,
    /// URL of the legacy tab-separated parts table.
    pub legacy_parts_url: String,
    /// URL of the legacy tab-separated colors table.
    pub legacy_colors_url: String,
    pub freshness_window: Duration,
}

impl CatalogConfig {
    pub fn new(
        archive_url: impl Into<String>,
        legacy_parts_url: impl Into<String>,
        legacy_colors_url: impl Into<String>,
    ) -> Self {
        Self {
            archive_url: archive_url.into(),
            legacy_parts_url: legacy_parts_url.into(),
            legacy_colors_url: legacy_colors_url.into(),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
        }
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }
}

/// Lifecycle of the service. `load_data` is a no-op once `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

/// Top-level façade over the transport, parser, and store.
#[derive(Debug)]
pub struct CatalogService {
    object_store: Arc<dyn ObjectStore>,
    transport: Transport,
    config: CatalogConfig,
    time_provider: Arc<dyn TimeProvider>,
    state: RwLock<ServiceState>,
    store: RwLock<Option<Arc<CatalogStore>>>,
}

impl CatalogService {
    pub fn new(object_store: Arc<dyn ObjectStore>, config: CatalogConfig) -> Self {
        Self::new_with_time_provider(object_store, config, Arc::new(SystemProvider::new()))
    }

    pub fn new_with_time_provider(
        object_store: Arc<dyn ObjectStore>,
        config: CatalogConfig,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            object_store,
            transport: Transport::new(),
            config,
            time_provider,
            state: RwLock::new(ServiceState::Uninitialized),
            store: RwLock::new(None),
        }
    }

    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    /// Load the catalog, adopting stored data when it is fresh and intact.
    ///
    /// Emits [`LoadEvent::Progress`] throughout and ends with exactly one
    /// terminal [`LoadEvent::Done`] or [`LoadEvent::Error`]. Once the
    /// service is `Ready`, further calls return the stored stats without
    /// any work. Cancellation via `cancel` aborts between chunks and
    /// leaves the store as it was found.
    pub async fn load_data<F>(&self, cancel: &CancellationToken, report: F) -> Result<CatalogStats>
    where
        F: Fn(LoadEvent) + Send + Sync,
    {
        if self.state() == ServiceState::Ready {
            if let Some(store) = self.current_store() {
                debug!("catalog already loaded, returning stored stats");
                let stats = store.stats();
                report(LoadEvent::Done {
                    stats: stats.clone(),
                });
                return Ok(stats);
            }
        }

        self.set_state(ServiceState::Initializing);
        match self.run_load(cancel, &report).await {
            Ok(stats) => {
                self.set_state(ServiceState::Ready);
                report(LoadEvent::Done {
                    stats: stats.clone(),
                });
                Ok(stats)
            }
            Err(err) => {
                self.set_state(ServiceState::Failed);
                report(LoadEvent::Error {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn run_load<F>(&self, cancel: &CancellationToken, report: &F) -> Result<CatalogStats>
    where
        F: Fn(LoadEvent) + Send + Sync,
    {
        emit(report, LoadStep::InitStore, 0, "opening catalog store");
        let store = CatalogStore::open(Arc::clone(&self.object_store)).await?;
        *self.store.write() = Some(Arc::clone(&store));
        emit(report, LoadStep::InitStore, 100, "catalog store ready");

        let has_data = store.has_existing_data();
        if let Some(metadata) = store.lcx_metadata() {
            if has_data && self.is_fresh(store.last_update().as_ref()) {
                info!(
                    source = metadata.source.as_str(),
                    version = metadata.version.as_str(),
                    "stored catalog is fresh, skipping download"
                );
                return Ok(store.stats());
            }
            if !has_data {
                warn!("catalog metadata present without data, clearing stale metadata");
                store.delete_metadata(LCX_METADATA_KEY).await?;
            }
        }

        match self.load_from_archive(&store, cancel, report).await {
            Ok(stats) => Ok(stats),
            Err(CatalogError::Cancelled) => Err(CatalogError::Cancelled),
            Err(primary) => {
                warn!(%primary, "LCX catalog load failed, falling back to legacy tables");
                match self.load_from_legacy(&store, cancel, report).await {
                    Ok(stats) => Ok(stats),
                    Err(CatalogError::Cancelled) => Err(CatalogError::Cancelled),
                    Err(fallback) => Err(CatalogError::LoadFailed {
                        primary: Box::new(primary),
                        fallback: Box::new(fallback),
                    }),
                }
            }
        }
    }

    async fn load_from_archive<F>(
        &self,
        store: &Arc<CatalogStore>,
        cancel: &CancellationToken,
        report: &F,
    ) -> Result<CatalogStats>
    where
        F: Fn(LoadEvent) + Send + Sync,
    {
        emit(report, LoadStep::Download, 0, "downloading catalog archive");
        let bytes = self
            .transport
            .fetch_with_progress(&self.config.archive_url, cancel, |percent, message| {
                emit(report, LoadStep::Download, percent, message);
            })
            .await?;

        let text = if self.config.archive_url.to_lowercase().ends_with(".gz") {
            emit(report, LoadStep::Decompress, 0, "decompressing catalog archive");
            self.transport
                .decompress_with_progress(&bytes, cancel, |percent, message| {
                    emit(report, LoadStep::Decompress, percent, message);
                })
                .await?
        } else {
            emit(report, LoadStep::Decompress, 100, "catalog archive is uncompressed");
            String::from_utf8(bytes.to_vec()).map_err(ParseError::from)?
        };

        emit(report, LoadStep::Parse, 0, "parsing catalog data");
        let parsed = parser::parse_str(&text)?;
        let stats = parsed.stats();
        emit(
            report,
            LoadStep::Parse,
            100,
            format!(
                "parsed {} parts, {} colors, {} categories",
                stats.parts, stats.colors, stats.categories
            ),
        );

        let last_update = LastUpdate {
            timestamp: self.time_provider.now_ms(),
            source: parsed.metadata.source.clone(),
            version: parsed.metadata.version.clone(),
        };
        let lcx_metadata = to_json(&parsed.metadata)?;
        let ParsedCatalog {
            categories,
            colors,
            parts,
            part_colors,
            ..
        } = parsed;

        self.save_tables(store, categories, colors, parts, part_colors, report)
            .await?;

        emit(report, LoadStep::Finalize, 0, "writing catalog metadata");
        store.set_metadata(LAST_UPDATE_KEY, to_json(&last_update)?).await?;
        store.set_metadata(LCX_METADATA_KEY, lcx_metadata).await?;
        emit(report, LoadStep::Finalize, 100, "catalog load complete");
        Ok(store.stats())
    }

    async fn load_from_legacy<F>(
        &self,
        store: &Arc<CatalogStore>,
        cancel: &CancellationToken,
        report: &F,
    ) -> Result<CatalogStats>
    where
        F: Fn(LoadEvent) + Send + Sync,
    {
        emit(report, LoadStep::Download, 0, "downloading legacy catalog tables");
        let parts_bytes = self
            .transport
            .fetch_with_progress(&self.config.legacy_parts_url, cancel, |percent, message| {
                emit(report, LoadStep::Download, percent / 2, message);
            })
            .await?;
        let colors_bytes = self
            .transport
            .fetch_with_progress(&self.config.legacy_colors_url, cancel, |percent, message| {
                emit(report, LoadStep::Download, 50 + percent / 2, message);
            })
            .await?;
        emit(report, LoadStep::Decompress, 100, "legacy tables are uncompressed");

        emit(report, LoadStep::Parse, 0, "parsing legacy catalog tables");
        let parts_text = String::from_utf8(parts_bytes.to_vec()).map_err(ParseError::from)?;
        let colors_text = String::from_utf8(colors_bytes.to_vec()).map_err(ParseError::from)?;
        let parsed = legacy::parse(&parts_text, &colors_text);
        if parsed.parts.is_empty() || parsed.colors.is_empty() {
            return Err(CatalogError::EmptyLegacy);
        }
        emit(
            report,
            LoadStep::Parse,
            100,
            format!(
                "parsed {} parts, {} colors, {} categories",
                parsed.parts.len(),
                parsed.colors.len(),
                parsed.categories.len()
            ),
        );

        self.save_tables(store, parsed.categories, parsed.colors, parsed.parts, None, report)
            .await?;

        emit(report, LoadStep::Finalize, 0, "writing catalog metadata");
        let last_update = LastUpdate {
            timestamp: self.time_provider.now_ms(),
            source: LEGACY_SOURCE.to_string(),
            version: "unknown".to_string(),
        };
        store.set_metadata(LAST_UPDATE_KEY, to_json(&last_update)?).await?;
        emit(report, LoadStep::Finalize, 100, "catalog load complete");
        Ok(store.stats())
    }

    /// Replace all catalog collections, strictly in dependency order.
    ///
    /// This is the commit point of a reload: the old dataset is only
    /// cleared here, after a replacement has parsed successfully.
    async fn save_tables<F>(
        &self,
        store: &Arc<CatalogStore>,
        categories: Vec<Category>,
        colors: Vec<Color>,
        parts: Vec<Part>,
        part_colors: Option<Vec<PartColor>>,
        report: &F,
    ) -> Result<()>
    where
        F: Fn(LoadEvent) + Send + Sync,
    {
        store.clear_catalog().await?;

        emit(
            report,
            LoadStep::SaveCategories,
            0,
            format!("saving {} categories", categories.len()),
        );
        store
            .bulk_replace(categories, |percent, message| {
                emit(report, LoadStep::SaveCategories, percent, message);
            })
            .await?;

        emit(report, LoadStep::SaveColors, 0, format!("saving {} colors", colors.len()));
        store
            .bulk_replace(colors, |percent, message| {
                emit(report, LoadStep::SaveColors, percent, message);
            })
            .await?;

        emit(report, LoadStep::SaveParts, 0, format!("saving {} parts", parts.len()));
        store
            .bulk_replace(parts, |percent, message| {
                emit(report, LoadStep::SaveParts, percent, message);
            })
            .await?;

        match part_colors {
            Some(part_colors) => {
                emit(
                    report,
                    LoadStep::SavePartColors,
                    0,
                    format!("saving {} part-color links", part_colors.len()),
                );
                store
                    .bulk_replace(part_colors, |percent, message| {
                        emit(report, LoadStep::SavePartColors, percent, message);
                    })
                    .await?;
            }
            None => {
                emit(
                    report,
                    LoadStep::SavePartColors,
                    100,
                    "catalog has no part-color links",
                );
            }
        }
        Ok(())
    }

    fn is_fresh(&self, last_update: Option<&LastUpdate>) -> bool {
        let Some(last) = last_update else {
            return false;
        };
        let age_ms = self.time_provider.now_ms().saturating_sub(last.timestamp);
        (age_ms.max(0) as u128) < self.config.freshness_window.as_millis()
    }

    fn set_state(&self, next: ServiceState) {
        debug!(state = ?next, "catalog service state change");
        *self.state.write() = next;
    }

    fn current_store(&self) -> Option<Arc<CatalogStore>> {
        self.store.read().as_ref().map(Arc::clone)
    }

    fn ready_store(&self) -> Option<Arc<CatalogStore>> {
        if self.state() != ServiceState::Ready {
            return None;
        }
        self.current_store()
    }

    // Query surface. All of these answer without store access until the
    // service is `Ready`.

    pub fn search_parts(&self, query: &str, limit: usize) -> Vec<PartHit> {
        self.ready_store()
            .map(|store| store.search_parts(query, limit))
            .unwrap_or_default()
    }

    pub fn search_colors(&self, query: &str, limit: usize) -> Vec<ColorHit> {
        self.ready_store()
            .map(|store| store.search_colors(query, limit))
            .unwrap_or_default()
    }

    pub fn popular_colors(&self, limit: usize) -> Vec<ColorHit> {
        self.ready_store()
            .map(|store| store.popular_colors(limit))
            .unwrap_or_default()
    }

    pub fn part_by_id(&self, bl_id: &str) -> Option<Part> {
        self.ready_store().and_then(|store| store.part_by_id(bl_id))
    }

    pub fn color_by_name(&self, name: &str) -> Option<Color> {
        self.ready_store()
            .and_then(|store| store.color_by_name(name))
    }

    pub fn color_by_id(&self, id: u32) -> Option<Color> {
        self.ready_store().and_then(|store| store.color_by_id(id))
    }

    pub fn categories(&self) -> Vec<Category> {
        self.ready_store()
            .map(|store| store.categories())
            .unwrap_or_default()
    }

    pub fn part_colors(&self, part_id: &str) -> Vec<PartColor> {
        self.ready_store()
            .map(|store| store.part_colors(part_id))
            .unwrap_or_default()
    }

    pub fn stats(&self) -> Option<CatalogStats> {
        self.ready_store().map(|store| store.stats())
    }
}

fn emit<F>(report: &F, step: LoadStep, percent: u8, message: impl Into<String>)
where
    F: Fn(LoadEvent) + Send + Sync,
{
    report(LoadEvent::Progress {
        step,
        percent,
        message: message.into(),
    });
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|err| CatalogError::Store(StoreError::Serialize(err)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use object_store::memory::InMemory;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::time::MockProvider;

    use super::*;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn lcx_document() -> String {
        json!({
            "schemaVersion": 1,
            "source": "bricklink",
            "version": "2024-06",
            "tables": {
                "categories": {
                    "cols": ["id", "name"],
                    "rows": [[5, "Brick"], [26, "Plate"]],
                },
                "colors": {
                    "cols": ["id", "name", "rgb", "type", "parts", "inSets",
                             "wanted", "forSale", "yearFrom", "yearTo"],
                    "rows": [
                        [11, "Black", "05131D", "Solid", 9000, 300, 5, 40, 1957, null],
                        [5, "Red", "C91A09", "Solid", 7000, 250, 4, 30, 1958, null],
                        [1, "White", "FFFFFF", "Solid", 8000, 280, 3, 35, 1957, null],
                    ],
                },
                "parts": {
                    "cols": ["blId", "name", "catId", "alt"],
                    "rows": [
                        ["3001", "Brick 2 x 4", 5, null],
                        ["3002", "Brick 2 x 3", 5, null],
                        ["3003", "Brick 2 x 2", 5, null],
                        ["3024", "Plate 1 x 1", 26, null],
                        ["3666", "Plate 1 x 6", 26, null],
                    ],
                },
            },
        })
        .to_string()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    const LEGACY_PARTS: &str = "\
parts\nheader\n\n\
5\tBrick\t3001\tBrick 2 x 4\n\
5\tBrick\t3002\tBrick 2 x 3\n\
26\tPlate\t3024\tPlate 1 x 1\n";

    const LEGACY_COLORS: &str = "\
colors\nheader\n\n\
11\tBlack\t05131D\tSolid\t9000\n\
5\tRed\tC91A09\tSolid\t7000\n";

    fn config_for(server: &mockito::Server) -> CatalogConfig {
        CatalogConfig::new(
            format!("{}/bricklink-catalog.lcx.json.gz", server.url()),
            format!("{}/bricklink/parts.csv", server.url()),
            format!("{}/bricklink/colors.csv", server.url()),
        )
    }

    fn service_on(
        object_store: &Arc<dyn ObjectStore>,
        config: CatalogConfig,
        now_ms: i64,
    ) -> CatalogService {
        CatalogService::new_with_time_provider(
            Arc::clone(object_store),
            config,
            Arc::new(MockProvider::new(now_ms)),
        )
    }

    async fn seed_catalog(object_store: &Arc<dyn ObjectStore>, last_update_ms: i64) {
        let store = CatalogStore::open(Arc::clone(object_store)).await.unwrap();
        store
            .bulk_replace(
                vec![Category {
                    id: 5,
                    name: "Brick".to_string(),
                }],
                |_, _| {},
            )
            .await
            .unwrap();
        store
            .bulk_replace(
                vec![Color {
                    id: 11,
                    name: "Black".to_string(),
                    rgb: Some("05131D".to_string()),
                    color_type: "Solid".to_string(),
                    parts: 9000,
                    in_sets: 0,
                    wanted: 0,
                    for_sale: 0,
                    year_from: None,
                    year_to: None,
                }],
                |_, _| {},
            )
            .await
            .unwrap();
        store
            .bulk_replace(
                vec![Part {
                    bl_id: "3001".to_string(),
                    part_id: "3001".to_string(),
                    name: "Brick 2 x 4".to_string(),
                    cat_id: 5,
                    alt: None,
                }],
                |_, _| {},
            )
            .await
            .unwrap();
        store
            .set_metadata(
                LAST_UPDATE_KEY,
                json!({"timestamp": last_update_ms, "source": "lcx", "version": "seed"}),
            )
            .await
            .unwrap();
        store
            .set_metadata(
                LCX_METADATA_KEY,
                json!({
                    "source": "lcx",
                    "version": "seed",
                    "schemaVersion": 1,
                    "parsedAt": "2024-01-01T00:00:00Z",
                }),
            )
            .await
            .unwrap();
    }

    fn collect_events() -> (Arc<Mutex<Vec<LoadEvent>>>, impl Fn(LoadEvent) + Send + Sync) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, move |event| sink.lock().unwrap().push(event))
    }

    #[test_log::test(tokio::test)]
    async fn loads_an_lcx_archive_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bricklink-catalog.lcx.json.gz")
            .with_status(200)
            .with_body(gzip(lcx_document().as_bytes()))
            .expect(1)
            .create_async()
            .await;

        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let service = service_on(&object_store, config_for(&server), 0);
        let (events, report) = collect_events();

        let stats = service
            .load_data(&CancellationToken::new(), report)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(service.state(), ServiceState::Ready);
        assert_eq!(stats.categories, 2);
        assert_eq!(stats.colors, 3);
        assert_eq!(stats.parts, 5);
        assert_eq!(stats.part_colors, 0);
        assert_eq!(stats.source.as_deref(), Some("bricklink"));

        let hits = service.search_parts("2 x 2", DEFAULT_PART_SEARCH_LIMIT);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value, "3003");
        assert_eq!(hits[0].category, "Brick");

        let events = events.lock().unwrap();
        assert!(events.iter().any(|event| matches!(
            event,
            LoadEvent::Progress { step: LoadStep::SavePartColors, percent: 100, .. }
        )));
        assert!(matches!(events.last(), Some(LoadEvent::Done { .. })));
    }

    #[test_log::test(tokio::test)]
    async fn second_load_is_a_no_op_once_ready() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bricklink-catalog.lcx.json.gz")
            .with_status(200)
            .with_body(gzip(lcx_document().as_bytes()))
            .expect(1)
            .create_async()
            .await;

        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let service = service_on(&object_store, config_for(&server), 0);

        let first = service
            .load_data(&CancellationToken::new(), |_| {})
            .await
            .unwrap();
        let second = service
            .load_data(&CancellationToken::new(), |_| {})
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(first, second);
    }

    #[test_log::test(tokio::test)]
    async fn fresh_stored_data_is_adopted_without_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bricklink-catalog.lcx.json.gz")
            .expect(0)
            .create_async()
            .await;

        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let now = 100 * HOUR_MS;
        seed_catalog(&object_store, now - HOUR_MS).await;

        let service = service_on(&object_store, config_for(&server), now);
        let stats = service
            .load_data(&CancellationToken::new(), |_| {})
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(service.state(), ServiceState::Ready);
        assert_eq!(stats.parts, 1);
        assert_eq!(stats.version.as_deref(), Some("seed"));
    }

    #[test_log::test(tokio::test)]
    async fn stale_stored_data_is_reloaded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bricklink-catalog.lcx.json.gz")
            .with_status(200)
            .with_body(gzip(lcx_document().as_bytes()))
            .expect(1)
            .create_async()
            .await;

        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let now = 100 * HOUR_MS;
        seed_catalog(&object_store, now - 25 * HOUR_MS).await;

        let service = service_on(&object_store, config_for(&server), now);
        let stats = service
            .load_data(&CancellationToken::new(), |_| {})
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(stats.parts, 5);
        assert_eq!(stats.version.as_deref(), Some("2024-06"));
    }

    #[test_log::test(tokio::test)]
    async fn metadata_without_data_self_heals_and_reloads() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bricklink-catalog.lcx.json.gz")
            .with_status(200)
            .with_body(gzip(lcx_document().as_bytes()))
            .create_async()
            .await;

        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let store = CatalogStore::open(Arc::clone(&object_store)).await.unwrap();
        store
            .set_metadata(LCX_METADATA_KEY, json!({"source": "lcx", "version": "ghost",
                "schemaVersion": 1, "parsedAt": "2024-01-01T00:00:00Z"}))
            .await
            .unwrap();
        drop(store);

        let service = service_on(&object_store, config_for(&server), 0);
        let stats = service
            .load_data(&CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(stats.parts, 5);
        assert_eq!(stats.version.as_deref(), Some("2024-06"));
    }

    #[test_log::test(tokio::test)]
    async fn falls_back_to_legacy_tables() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bricklink-catalog.lcx.json.gz")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/bricklink/parts.csv")
            .with_status(200)
            .with_body(LEGACY_PARTS)
            .create_async()
            .await;
        server
            .mock("GET", "/bricklink/colors.csv")
            .with_status(200)
            .with_body(LEGACY_COLORS)
            .create_async()
            .await;

        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let service = service_on(&object_store, config_for(&server), 42);
        let stats = service
            .load_data(&CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(service.state(), ServiceState::Ready);
        assert_eq!(stats.parts, 3);
        assert_eq!(stats.colors, 2);
        assert_eq!(stats.categories, 2);
        assert_eq!(
            stats.last_update.map(|l| l.source),
            Some(LEGACY_SOURCE.to_string())
        );
        assert_eq!(stats.source, None);
    }

    #[test_log::test(tokio::test)]
    async fn surfaces_error_when_both_paths_fail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bricklink-catalog.lcx.json.gz")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/bricklink/parts.csv")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/bricklink/colors.csv")
            .with_status(500)
            .create_async()
            .await;

        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let service = service_on(&object_store, config_for(&server), 0);
        let (events, report) = collect_events();

        let err = service
            .load_data(&CancellationToken::new(), report)
            .await
            .unwrap_err();

        assert_eq!(service.state(), ServiceState::Failed);
        let message = err.to_string();
        assert!(message.contains("404"), "message was: {message}");
        assert!(message.contains("legacy fallback"), "message was: {message}");
        let events = events.lock().unwrap();
        assert!(matches!(events.last(), Some(LoadEvent::Error { .. })));
    }

    #[test_log::test(tokio::test)]
    async fn cancellation_leaves_existing_data_untouched() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bricklink-catalog.lcx.json.gz")
            .with_status(200)
            .with_body(gzip(lcx_document().as_bytes()))
            .create_async()
            .await;

        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        seed_catalog(&object_store, 0).await;
        // Strip the LCX provenance so the service decides to reload.
        let store = CatalogStore::open(Arc::clone(&object_store)).await.unwrap();
        store.delete_metadata(LCX_METADATA_KEY).await.unwrap();
        let had_data = store.has_existing_data();
        drop(store);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let service = service_on(&object_store, config_for(&server), 0);
        let err = service.load_data(&cancel, |_| {}).await.unwrap_err();
        assert!(matches!(err, CatalogError::Cancelled));

        let store = CatalogStore::open(Arc::clone(&object_store)).await.unwrap();
        assert_eq!(store.has_existing_data(), had_data);
        assert!(store.part_by_id("3001").is_some());
    }

    #[test_log::test(tokio::test)]
    async fn queries_answer_empty_before_ready() {
        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let service = service_on(
            &object_store,
            CatalogConfig::new("http://invalid/a.gz", "http://invalid/p", "http://invalid/c"),
            0,
        );

        assert_eq!(service.state(), ServiceState::Uninitialized);
        assert_eq!(service.search_parts("3001", 50), Vec::new());
        assert_eq!(service.search_colors("black", 20), Vec::new());
        assert_eq!(service.part_by_id("3001"), None);
        assert_eq!(service.stats(), None);
    }
}
