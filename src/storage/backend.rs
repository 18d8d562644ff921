//! Storage backend trait definition

use async_trait::async_trait;

use super::error::StorageResult;
use crate::alerts::AlertStateDocument;
use crate::cache::SnapshotCache;

/// Durable home of the snapshot cache and the alert state.
///
/// Loads return `Ok(None)` when nothing was stored yet and an error when
/// something was stored but cannot be read back. Callers treat both as
/// "start empty"; only the log line differs.
///
/// Implementations must be `Send + Sync` as they are shared between the
/// scheduler and the binary.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn load_snapshot(&self) -> StorageResult<Option<SnapshotCache>>;

    /// Overwrite the stored snapshot. Readers of the store never see a
    /// partially written document.
    async fn save_snapshot(&self, cache: &SnapshotCache) -> StorageResult<()>;

    async fn load_alert_state(&self) -> StorageResult<Option<AlertStateDocument>>;

    async fn save_alert_state(&self, document: &AlertStateDocument) -> StorageResult<()>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
