//! Storage backends for the snapshot cache and the alert state
//!
//! ## Backends
//!
//! - **JSON** (default): two documents in a data directory, written atomically
//! - **In-Memory**: no persistence, for tests or `backend = "none"`
//!
//! Persistence failures are never fatal: the scheduler logs them and keeps
//! the in-memory state authoritative until the next successful write.

pub mod backend;
pub mod error;
pub mod json;
pub mod memory;

use std::sync::Arc;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};

use crate::config::StorageConfig;

/// Build the backend selected in the configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config {
        StorageConfig::None => Arc::new(memory::MemoryBackend::new()),
        StorageConfig::Json { dir } => Arc::new(json::JsonFileBackend::new(dir).await?),
    };
    Ok(backend)
}
