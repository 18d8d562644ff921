//! Notification dispatchers
//!
//! The scheduler calls [`NotificationDispatcher::dispatch`] at most once per
//! cycle, with every alert that became due in that cycle. A failed dispatch
//! is logged by the caller and not retried.

pub mod discord;
pub mod email;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{error, warn};

use crate::TargetKind;
use crate::alerts::{Alert, worst_severity};
use crate::config::Notifier;
use crate::monitors::Severity;

pub use discord::DiscordDispatcher;
pub use email::EmailDispatcher;
pub use webhook::WebhookDispatcher;

/// Result of one dispatch, counted in sinks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub failed: usize,
}

impl DispatchOutcome {
    pub fn delivered() -> Self {
        Self {
            delivered: 1,
            failed: 0,
        }
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, alerts: &[Alert]) -> anyhow::Result<DispatchOutcome>;
}

/// Headline of a batch, derived from its worst severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertSummary {
    pub severity: Severity,
    pub subject: &'static str,
    pub emoji: &'static str,
    pub color: u32,
}

impl AlertSummary {
    pub fn of(alerts: &[Alert]) -> Option<Self> {
        let summary = match worst_severity(alerts)? {
            Severity::Down => Self {
                severity: Severity::Down,
                subject: "URGENT: Server(s) Down",
                emoji: "🚨",
                color: 0x64748b,
            },
            Severity::Critical => Self {
                severity: Severity::Critical,
                subject: "CRITICAL: Server Alert",
                emoji: "🔥",
                color: 0xdc2626,
            },
            Severity::Warning => Self {
                severity: Severity::Warning,
                subject: "WARNING: Server Alert",
                emoji: "⚠️",
                color: 0xf59e0b,
            },
            Severity::Healthy => return None,
        };
        Some(summary)
    }

    pub fn headline(&self) -> String {
        format!("{} {}", self.emoji, self.subject)
    }
}

pub(crate) fn kind_icon(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Host => "🖥️",
        TargetKind::Container => "🐳",
    }
}

pub(crate) fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Down => "❌",
        Severity::Critical => "🔥",
        Severity::Warning => "⚠️",
        Severity::Healthy => "✅",
    }
}

/// Writes alerts to the log. Used when no notifier is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, alerts: &[Alert]) -> anyhow::Result<DispatchOutcome> {
        let Some(summary) = AlertSummary::of(alerts) else {
            return Ok(DispatchOutcome::default());
        };

        warn!("{} ({} alert(s))", summary.headline(), alerts.len());
        for alert in alerts {
            warn!(
                "{} {} [{}] {}: {}",
                severity_icon(alert.severity),
                kind_icon(alert.kind),
                alert.severity,
                alert.name,
                alert.message
            );
        }
        Ok(DispatchOutcome::delivered())
    }
}

/// Delivers every batch to all sinks concurrently. Fails only if every sink
/// failed.
#[derive(Clone, Default)]
pub struct FanoutDispatcher {
    sinks: Vec<(String, Arc<dyn NotificationDispatcher>)>,
}

impl FanoutDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, sink: Arc<dyn NotificationDispatcher>) -> Self {
        self.sinks.push((name.into(), sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationDispatcher for FanoutDispatcher {
    async fn dispatch(&self, alerts: &[Alert]) -> anyhow::Result<DispatchOutcome> {
        let results = join_all(self.sinks.iter().map(|(_, sink)| sink.dispatch(alerts))).await;

        let mut outcome = DispatchOutcome::default();
        for ((name, _), result) in self.sinks.iter().zip(results) {
            match result {
                Ok(sink_outcome) => {
                    outcome.delivered += sink_outcome.delivered;
                    outcome.failed += sink_outcome.failed;
                }
                Err(e) => {
                    error!("notification sink {name} failed: {e:#}");
                    outcome.failed += 1;
                }
            }
        }

        if outcome.delivered == 0 && outcome.failed > 0 {
            bail!("all {} notification sink(s) failed", outcome.failed);
        }
        Ok(outcome)
    }
}

/// Upper bound for one request to a Discord or webhook endpoint
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatcher for the configured notifiers; the log if there are none.
pub fn from_config(notifiers: &[Notifier]) -> Arc<dyn NotificationDispatcher> {
    if notifiers.is_empty() {
        return Arc::new(LogDispatcher);
    }

    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            warn!("failed to build HTTP client, using defaults: {e}");
            reqwest::Client::new()
        });

    let fanout = notifiers
        .iter()
        .fold(FanoutDispatcher::new(), |fanout, notifier| match notifier {
            Notifier::Discord(discord) => fanout.with(
                "discord",
                Arc::new(DiscordDispatcher::new(client.clone(), discord.clone())),
            ),
            Notifier::Webhook(webhook) => fanout.with(
                "webhook",
                Arc::new(WebhookDispatcher::new(client.clone(), webhook.clone())),
            ),
            Notifier::Email(email) => match EmailDispatcher::new(email) {
                Ok(dispatcher) => fanout.with("email", Arc::new(dispatcher)),
                Err(e) => {
                    error!("email notifier disabled: {e:#}");
                    fanout
                }
            },
        });
    if fanout.is_empty() {
        return Arc::new(LogDispatcher);
    }
    Arc::new(fanout)
}
