//! JSON file storage backend
//!
//! Two documents in one data directory:
//!
//! - `metrics-cache.json`: the last [`SnapshotCache`]
//! - `alert-state.json`: the alert tracker, keyed `"<targetId>_<severity>"`
//!
//! Writes go to a hidden temporary file next to the target and are renamed
//! over it, so a crash mid-write leaves the previous document intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, info, instrument};

use super::backend::StorageBackend;
use super::error::{StorageError, StorageResult};
use crate::alerts::AlertStateDocument;
use crate::cache::SnapshotCache;

pub const CACHE_FILE: &str = "metrics-cache.json";
pub const ALERT_STATE_FILE: &str = "alert-state.json";

#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    /// Create the backend, creating `dir` if it does not exist yet.
    #[instrument(skip_all)]
    pub async fn new(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(StorageError::io(&dir))?;

        info!("storing monitor state in {}", dir.display());
        Ok(Self { dir })
    }

    pub fn cache_path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    pub fn alert_state_path(&self) -> PathBuf {
        self.dir.join(ALERT_STATE_FILE)
    }

    async fn read_document<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} does not exist yet", path.display());
                return Ok(None);
            }
            Err(e) => return Err(StorageError::io(path)(e)),
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn write_document<T: Serialize>(
        path: &Path,
        what: &'static str,
        document: &T,
    ) -> StorageResult<()> {
        let content = serde_json::to_vec_pretty(document)
            .map_err(|source| StorageError::Serialization { what, source })?;

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(what);
        let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

        fs::write(&temp_path, content)
            .await
            .map_err(StorageError::io(&temp_path))?;
        fs::rename(&temp_path, path)
            .await
            .map_err(StorageError::io(path))
    }
}

#[async_trait]
impl StorageBackend for JsonFileBackend {
    async fn load_snapshot(&self) -> StorageResult<Option<SnapshotCache>> {
        Self::read_document(&self.cache_path()).await
    }

    #[instrument(skip_all, fields(targets = cache.targets.len()))]
    async fn save_snapshot(&self, cache: &SnapshotCache) -> StorageResult<()> {
        Self::write_document(&self.cache_path(), "snapshot cache", cache).await
    }

    async fn load_alert_state(&self) -> StorageResult<Option<AlertStateDocument>> {
        Self::read_document(&self.alert_state_path()).await
    }

    #[instrument(skip_all, fields(records = document.len()))]
    async fn save_alert_state(&self, document: &AlertStateDocument) -> StorageResult<()> {
        Self::write_document(&self.alert_state_path(), "alert state", document).await
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
