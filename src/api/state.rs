//! API shared state

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::actors::SchedulerHandle;
use crate::cache::SnapshotStore;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Snapshot store written by the scheduler; read without locking
    pub store: Arc<SnapshotStore>,

    /// Handle to the scheduler actor, for the alert state
    pub scheduler: SchedulerHandle,

    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(scheduler: SchedulerHandle) -> Self {
        Self {
            store: scheduler.store(),
            scheduler,
            started_at: Utc::now(),
        }
    }
}
