//! The brickstash catalog: a versioned, indexed local store for the
//! BrickLink categories/colors/parts/partColors dataset, and the service
//! that loads it.
//!
//! [`store::CatalogStore`] keeps the dataset in memory behind a lock, with
//! secondary indexes for the lookups the query surface needs, and persists
//! versioned snapshots through an injectable [`object_store::ObjectStore`]
//! (in-memory for tests, local filesystem in production).
//!
//! [`service::CatalogService`] decides whether stored data is fresh,
//! orchestrates the load pipeline (download, decompress, parse, bulk
//! persist) with tagged progress events and cooperative cancellation, falls
//! back to the legacy tabular format when the LCX path fails, and exposes
//! the search/get query surface consumed by UI collaborators.

pub mod service;
pub mod store;
pub mod time;

mod serialize;
mod snapshot;

pub use service::{CatalogConfig, CatalogError, CatalogService, ServiceState};
pub use store::{CatalogStore, StoreError};
