use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{info, instrument};

use super::{AlertSummary, DispatchOutcome, NotificationDispatcher};
use crate::alerts::Alert;
use crate::config::Webhook;

/// Posts each alert batch as one JSON document:
///
/// ```json
/// { "subject": "...", "severity": "critical", "alerts": [...], "timestamp": "..." }
/// ```
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: Client,
    config: Webhook,
}

impl WebhookDispatcher {
    pub fn new(client: Client, config: Webhook) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    #[instrument(skip_all, fields(alerts = alerts.len()))]
    async fn dispatch(&self, alerts: &[Alert]) -> anyhow::Result<DispatchOutcome> {
        let Some(summary) = AlertSummary::of(alerts) else {
            return Ok(DispatchOutcome::default());
        };

        let payload = json!({
            "subject": summary.headline(),
            "severity": summary.severity,
            "alerts": alerts,
            "timestamp": Utc::now().to_rfc3339()
        });

        let response = self
            .client
            .post(&self.config.url)
            .json(&payload)
            .send()
            .await
            .context("failed to send webhook alert")?;

        if !response.status().is_success() {
            bail!("webhook alert failed with status: {}", response.status());
        }

        info!("Successfully sent webhook alert");
        Ok(DispatchOutcome::delivered())
    }
}
