use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::{trace, warn};

use crate::Target;

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Keep everything in memory (nothing survives a restart)
    #[serde(rename = "none")]
    None,

    /// JSON documents in a data directory (default)
    Json {
        /// Directory holding `metrics-cache.json` and `alert-state.json`
        #[serde(default = "default_data_dir")]
        dir: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Json {
            dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Milliseconds between two collection cycles
    pub poll_interval_ms: u64,

    /// Upper bound for a single target's collection
    pub collect_timeout_secs: u64,

    /// Upper bound for delivering one alert batch to all notifiers
    pub dispatch_timeout_secs: u64,

    /// Minimum time between two notifications for the same unresolved alert
    pub renotify_after_secs: u64,

    /// Resolved alert records older than this are pruned (kept forever if unset)
    pub alert_retention_days: Option<u32>,

    /// Targets defined inline
    pub targets: Vec<Target>,

    /// Registry file (`{ "servers": [...] }`) re-read on every cycle
    pub targets_file: Option<PathBuf>,

    pub containers: ContainerConfig,

    pub ssh: SshConfig,

    pub cloud: CloudConfig,

    pub storage: StorageConfig,

    pub notifications: Vec<Notifier>,

    /// Read-only status API (disabled if unset)
    pub api: Option<ApiConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: crate::util::get_default_poll_interval_ms(),
            collect_timeout_secs: 30,
            dispatch_timeout_secs: 60,
            renotify_after_secs: 60 * 60,
            alert_retention_days: None,
            targets: Vec::new(),
            targets_file: None,
            containers: ContainerConfig::default(),
            ssh: SshConfig::default(),
            cloud: CloudConfig::default(),
            storage: StorageConfig::default(),
            notifications: Vec::new(),
            api: None,
        }
    }
}

impl Config {
    /// Poll interval, with `MONITOR_INTERVAL` taking precedence over the file.
    pub fn poll_interval(&self) -> Duration {
        crate::util::get_poll_interval_override()
            .unwrap_or_else(|| Duration::from_millis(self.poll_interval_ms.max(1)))
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_secs(self.collect_timeout_secs.max(1))
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs.max(1))
    }

    /// Configured notifiers, plus an SMTP notifier from the environment if
    /// none is configured in the file.
    pub fn notifiers(&self) -> Vec<Notifier> {
        let mut notifiers = self.notifications.clone();
        let has_email = notifiers
            .iter()
            .any(|notifier| matches!(notifier, Notifier::Email(_)));
        if !has_email {
            notifiers.extend(Email::from_env().map(Notifier::Email));
        }
        notifiers
    }

    /// Out-of-range values fall back to one hour.
    pub fn renotify_after(&self) -> chrono::Duration {
        i64::try_from(self.renotify_after_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| {
                warn!(
                    "renotify_after_secs = {} is out of range, using one hour",
                    self.renotify_after_secs
                );
                chrono::Duration::hours(1)
            })
    }

    /// Out-of-range values disable pruning.
    pub fn alert_retention(&self) -> Option<chrono::Duration> {
        let days = self.alert_retention_days?;
        let retention = chrono::Duration::try_days(i64::from(days));
        if retention.is_none() {
            warn!("alert_retention_days = {days} is out of range, keeping resolved alerts");
        }
        retention
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Discover local containers and monitor them as targets
    pub enabled: bool,
    pub binary: String,
    pub command_timeout_secs: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "docker".to_string(),
            command_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub binary: String,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    /// Additional `-o` options, e.g. `"UserKnownHostsFile=/dev/null"`
    pub options: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            connect_timeout_secs: 10,
            command_timeout_secs: 20,
            options: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub binary: String,
    /// Falls back to the CLI's own region resolution (`AWS_REGION`, profile) if unset
    pub region: Option<String>,
    pub profile: Option<String>,
    pub command_timeout_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            binary: "aws".to_string(),
            region: None,
            profile: None,
            command_timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notifier {
    Discord(Discord),
    Webhook(Webhook),
    Email(Email),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

/// SMTP alert emails
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Email {
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Implicit TLS (usually port 465); STARTTLS otherwise
    #[serde(default)]
    pub secure: bool,

    pub username: String,
    pub password: String,

    /// Sender address, defaults to `username`
    #[serde(default)]
    pub from: Option<String>,

    /// Comma separated recipients
    pub to: String,
}

fn default_smtp_port() -> u16 {
    587
}

impl Email {
    /// Settings from `SMTP_HOST`, `SMTP_PORT`, `SMTP_SECURE`, `SMTP_USER`,
    /// `SMTP_PASS`, `SMTP_FROM` and `ALERT_EMAIL_TO`. `None` unless host,
    /// user, password and recipient are all set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Some(Self {
            host: var("SMTP_HOST")?,
            port: var("SMTP_PORT")
                .and_then(|port| port.trim().parse().ok())
                .unwrap_or_else(default_smtp_port),
            secure: var("SMTP_SECURE").is_some_and(|secure| secure.trim() == "true"),
            username: var("SMTP_USER")?,
            password: var("SMTP_PASS")?,
            from: var("SMTP_FROM"),
            to: var("ALERT_EMAIL_TO")?,
        })
    }
}

/// API server configuration
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Bearer token required for everything except health and the public
    /// status list
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Enable permissive CORS for browser dashboards
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            auth_token: None,
            enable_cors: default_enable_cors(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_enable_cors() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_str(&file_content)
        .context("invalid configuration file provided")
        .inspect(|config| trace!("loaded config: {config:?}"))
}
