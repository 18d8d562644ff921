pub mod actors;
pub mod alerts;
pub mod api;
pub mod cache;
pub mod collectors;
pub mod config;
pub mod monitors;
pub mod notify;
pub mod registry;
pub mod storage;
pub mod util;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::util::parse_percent;

/// A monitored host or container as listed by a target registry.
///
/// The capability fields decide which collector family applies:
/// `host` + `username` + `private_key` enable remote-shell sampling,
/// `instance_id` enables the cloud API and `container` routes the target to
/// the container engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: String,
    pub name: String,

    /// Public-facing alias
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Path of the private key handed to `ssh -i`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    /// Whether the target shows up on the public status listing
    #[serde(default)]
    pub public: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Target {
    /// Target without any collector capability.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            display_name: None,
            host: None,
            port: None,
            username: None,
            private_key: None,
            instance_id: None,
            container: None,
            public: false,
            created_at: None,
        }
    }

    pub fn kind(&self) -> TargetKind {
        if self.container.is_some() {
            TargetKind::Container
        } else {
            TargetKind::Host
        }
    }

    /// SSH credentials, only if all three required parts are configured.
    pub fn ssh_credentials(&self) -> Option<SshCredentials<'_>> {
        let (Some(host), Some(username), Some(private_key)) =
            (&self.host, &self.username, &self.private_key)
        else {
            return None;
        };

        Some(SshCredentials {
            host,
            port: self.port,
            username,
            private_key,
        })
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SshCredentials<'a> {
    pub host: &'a str,
    pub port: Option<u16>,
    pub username: &'a str,
    pub private_key: &'a Path,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Host,
    Container,
}

/// Status tag of a target after one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RunState {
    Running,
    Stopped,
    Unreachable,
    #[default]
    Unknown,
    Error,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Stopped => "stopped",
            RunState::Unreachable => "unreachable",
            RunState::Unknown => "unknown",
            RunState::Error => "error",
        }
    }

    /// Targets in these states count as issues in the cycle summary.
    pub fn is_issue(self) -> bool {
        matches!(self, RunState::Error | RunState::Unreachable)
    }

    /// Map an EC2 instance state name (`pending`, `running`, `stopping`, ...).
    pub fn from_instance_state(state: &str) -> Self {
        match state {
            "running" => RunState::Running,
            "stopping" | "stopped" | "shutting-down" | "terminated" => RunState::Stopped,
            _ => RunState::Unknown,
        }
    }

    /// Map a container engine state (`running`, `exited`, `paused`, ...).
    pub fn from_container_state(state: &str) -> Self {
        match state {
            "running" => RunState::Running,
            "exited" | "dead" | "paused" | "created" | "removing" => RunState::Stopped,
            _ => RunState::Unknown,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RunState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RunState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let state = match raw.as_str() {
            "running" => RunState::Running,
            "stopped" => RunState::Stopped,
            "unreachable" => RunState::Unreachable,
            "error" => RunState::Error,
            // older caches stored raw cloud instance states here
            other => RunState::from_instance_state(other),
        };
        Ok(state)
    }
}

/// One successful collection for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// CPU utilization in percent
    #[serde(
        default,
        deserialize_with = "lenient_percent",
        skip_serializing_if = "Option::is_none"
    )]
    pub cpu: Option<f64>,

    /// Memory utilization in percent
    #[serde(
        default,
        deserialize_with = "lenient_percent",
        skip_serializing_if = "Option::is_none"
    )]
    pub ram: Option<f64>,

    /// Root filesystem utilization in percent
    #[serde(
        default,
        deserialize_with = "lenient_percent",
        skip_serializing_if = "Option::is_none"
    )]
    pub disk: Option<f64>,

    #[serde(
        default,
        deserialize_with = "lenient_magnitude",
        skip_serializing_if = "Option::is_none"
    )]
    pub disk_total: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_magnitude",
        skip_serializing_if = "Option::is_none"
    )]
    pub disk_used: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_magnitude",
        skip_serializing_if = "Option::is_none"
    )]
    pub disk_free: Option<String>,

    /// Raw memory usage as reported by the container engine, e.g. `"1.2GiB / 4GiB"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl MetricsSnapshot {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            cpu: None,
            ram: None,
            disk: None,
            disk_total: None,
            disk_used: None,
            disk_free: None,
            memory_usage: None,
            timestamp,
        }
    }

    /// Snapshot carrying only the three utilization values.
    pub fn with_usage(cpu: Option<f64>, ram: Option<f64>, disk: Option<f64>) -> Self {
        Self {
            cpu,
            ram,
            disk,
            ..Self::empty(Utc::now())
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPercent {
    Number(f64),
    Text(String),
}

/// Accepts numbers as well as the stringly values older caches contain
/// (`"12.50"`, `"N/A (Enable SSH)"`). Sentinels become `None`.
fn lenient_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let raw = Option::<RawPercent>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|raw| match raw {
            RawPercent::Number(value) => Some(value),
            RawPercent::Text(text) => parse_percent(&text),
        })
        .filter(|value| value.is_finite()))
}

fn lenient_magnitude<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|value| !value.is_empty() && !value.starts_with("N/A")))
}

/// Extra facts a collector learned about the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetDetails {
    Instance(InstanceDetails),
    Container(ContainerDetails),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDetails {
    pub instance_id: String,
    pub state: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDetails {
    pub container_id: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Per-target outcome of one cycle. Replaces the previous value wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default)]
    pub kind: TargetKind,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub public: bool,

    pub status: RunState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<TargetDetails>,
}

impl TargetStatus {
    pub fn for_target(target: &Target, status: RunState) -> Self {
        Self {
            id: target.id.clone(),
            name: target.name.clone(),
            display_name: target.display_name.clone(),
            kind: target.kind(),
            public: target.public,
            status,
            metrics: None,
            error: None,
            details: None,
        }
    }

    pub fn failed(target: &Target, status: RunState, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::for_target(target, status)
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsSnapshot) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Raw state reported by the container engine or cloud API, if any.
    pub fn reported_state(&self) -> Option<&str> {
        match &self.details {
            Some(TargetDetails::Container(details)) => Some(&details.state),
            Some(TargetDetails::Instance(details)) => Some(&details.state),
            None => None,
        }
    }
}
