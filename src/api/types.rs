//! API response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::AlertStateDocument;
use crate::monitors::{Severity, classify};
use crate::{RunState, TargetKind, TargetStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    /// Seconds since the hub started
    pub uptime: i64,
    pub last_update: Option<DateTime<Utc>>,
    pub targets: usize,
}

/// A cached status together with its current severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetView {
    #[serde(flatten)]
    pub status: TargetStatus,
    pub severity: Severity,
}

impl From<&TargetStatus> for TargetView {
    fn from(status: &TargetStatus) -> Self {
        Self {
            severity: classify(status),
            status: status.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetsResponse {
    pub targets: Vec<TargetView>,
    pub count: usize,
    pub last_update: Option<DateTime<Utc>>,
}

/// Entry of the public status list. Carries no identifiers, errors or
/// infrastructure details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicTarget {
    pub name: String,
    pub kind: TargetKind,
    pub status: RunState,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<f64>,
}

impl From<&TargetStatus> for PublicTarget {
    fn from(status: &TargetStatus) -> Self {
        let metrics = status.metrics.as_ref();
        Self {
            name: status.label().to_string(),
            kind: status.kind,
            status: status.status,
            severity: classify(status),
            cpu: metrics.and_then(|metrics| metrics.cpu),
            ram: metrics.and_then(|metrics| metrics.ram),
            disk: metrics.and_then(|metrics| metrics.disk),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsResponse {
    pub alerts: AlertStateDocument,
    pub count: usize,
}
