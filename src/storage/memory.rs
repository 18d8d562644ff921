//! In-memory storage backend (no persistence)
//!
//! Used when `storage.backend` is `none` and by tests. Everything is lost on
//! restart.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use super::backend::StorageBackend;
use super::error::StorageResult;
use crate::alerts::AlertStateDocument;
use crate::cache::SnapshotCache;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    snapshot: RwLock<Option<SnapshotCache>>,
    alert_state: RwLock<Option<AlertStateDocument>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-seeded with a snapshot, as if a previous run had saved it.
    pub fn with_snapshot(cache: SnapshotCache) -> Self {
        Self {
            snapshot: RwLock::new(Some(cache)),
            alert_state: RwLock::new(None),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn load_snapshot(&self) -> StorageResult<Option<SnapshotCache>> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn save_snapshot(&self, cache: &SnapshotCache) -> StorageResult<()> {
        trace!("keeping snapshot of {} target(s) in memory", cache.targets.len());
        *self.snapshot.write().await = Some(cache.clone());
        Ok(())
    }

    async fn load_alert_state(&self) -> StorageResult<Option<AlertStateDocument>> {
        Ok(self.alert_state.read().await.clone())
    }

    async fn save_alert_state(&self, document: &AlertStateDocument) -> StorageResult<()> {
        *self.alert_state.write().await = Some(document.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
