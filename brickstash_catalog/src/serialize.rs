//! Reading and writing store snapshots through the object store.

use std::sync::Arc;

use anyhow::anyhow;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use serde_json::Value;
use tracing::info;

use crate::snapshot::{SNAPSHOT_SCHEMA_VERSION, StoreSnapshotV1, StoreSnapshotV2};
use crate::store::StoreError;

type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Load and version-dispatch a persisted snapshot.
///
/// Returns `None` when no snapshot exists yet. The boolean is true when the
/// snapshot was migrated from an older version and should be re-persisted.
pub(crate) async fn load_snapshot(
    object_store: &Arc<dyn ObjectStore>,
    path: &Path,
) -> Result<Option<(StoreSnapshotV2, bool)>> {
    let bytes = match object_store.get(path).await {
        Ok(result) => result.bytes().await?,
        Err(object_store::Error::NotFound { .. }) => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let doc: Value = serde_json::from_slice(&bytes)?;
    let version = doc.get("schemaVersion").and_then(Value::as_u64);
    match version {
        Some(1) => {
            info!("migrating catalog snapshot from version 1 to {SNAPSHOT_SCHEMA_VERSION}");
            let v1: StoreSnapshotV1 = serde_json::from_value(doc)?;
            Ok(Some((v1.into(), true)))
        }
        Some(SNAPSHOT_SCHEMA_VERSION) => Ok(Some((serde_json::from_value(doc)?, false))),
        other => Err(StoreError::Unexpected(anyhow!(
            "unsupported catalog snapshot version {other:?}"
        ))),
    }
}

pub(crate) async fn persist_snapshot(
    object_store: &Arc<dyn ObjectStore>,
    path: &Path,
    snapshot: &StoreSnapshotV2,
) -> Result<()> {
    let bytes = serde_json::to_vec(snapshot)?;
    object_store.put(path, PutPayload::from(bytes)).await?;
    Ok(())
}
