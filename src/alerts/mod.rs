//! Alert records and their deduplication state

pub mod tracker;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::monitors::{Severity, describe};
use crate::{MetricsSnapshot, RunState, TargetKind, TargetStatus};

pub use tracker::{AlertKey, AlertRecord, AlertStateDocument, AlertStateTracker};

/// A newly-due alert, with enough context for a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub target_id: String,
    /// Display name if the target has one
    pub name: String,
    pub kind: TargetKind,
    pub severity: Severity,
    pub status: RunState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(status: &TargetStatus, severity: Severity, timestamp: DateTime<Utc>) -> Self {
        Self {
            target_id: status.id.clone(),
            name: status.label().to_string(),
            kind: status.kind,
            severity,
            status: status.status,
            message: describe(status, severity),
            metrics: status.metrics.clone(),
            timestamp,
        }
    }
}

/// Worst severity of a batch, if any.
pub fn worst_severity(alerts: &[Alert]) -> Option<Severity> {
    alerts.iter().map(|alert| alert.severity).max()
}
