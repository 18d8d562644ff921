//! Latest per-target statuses, shared between the scheduler and readers.
//!
//! The scheduler builds a complete [`SnapshotCache`] per cycle and swaps it in
//! with [`SnapshotStore::replace`]. Readers get an `Arc` of whichever cache was
//! current when they asked and never observe a half-written cycle.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TargetStatus;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCache {
    /// One entry per target of the cycle, in registry order
    #[serde(default, alias = "servers")]
    pub targets: Vec<TargetStatus>,

    /// Completion time of the cycle; `None` until the first cycle finished
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

impl SnapshotCache {
    pub fn new(targets: Vec<TargetStatus>, last_update: DateTime<Utc>) -> Self {
        Self {
            targets,
            last_update: Some(last_update),
        }
    }

    pub fn get(&self, id: &str) -> Option<&TargetStatus> {
        self.targets.iter().find(|status| status.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: ArcSwap<SnapshotCache>,
}

impl SnapshotStore {
    pub fn new(initial: SnapshotCache) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Current cache. Cheap; never blocks the writer.
    pub fn get(&self) -> Arc<SnapshotCache> {
        self.current.load_full()
    }

    /// Publish a complete cycle result.
    pub fn replace(&self, cache: SnapshotCache) -> Arc<SnapshotCache> {
        let cache = Arc::new(cache);
        self.current.store(cache.clone());
        cache
    }
}
