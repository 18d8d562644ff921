//! Message types for actor communication
//!
//! Commands are sent to the scheduler actor via mpsc; every command carries
//! a oneshot channel for the reply.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::alerts::AlertStateDocument;

/// Summary of one completed collection cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Targets listed by the registry (and present in the new cache)
    pub targets: usize,

    /// Targets whose status is `error` or `unreachable`
    pub issues: usize,

    /// Alerts that became due and were handed to the dispatcher
    pub alerts: usize,

    /// Whether handing the alerts to the dispatcher failed
    pub dispatch_failed: bool,

    pub duration: Duration,

    /// Timestamp written to the cache as `lastUpdate`
    pub finished_at: DateTime<Utc>,
}

/// Commands that can be sent to the scheduler actor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a cycle now. Serialised with the timer, so it never overlaps
    /// another cycle.
    PollNow {
        respond_to: oneshot::Sender<CycleReport>,
    },

    /// Read the alert tracker in its persisted form
    GetAlertState {
        respond_to: oneshot::Sender<AlertStateDocument>,
    },

    /// Stop ticking. An in-flight cycle finishes first; the reply is sent
    /// once the actor has left its loop.
    Shutdown { respond_to: oneshot::Sender<()> },
}
