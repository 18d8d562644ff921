use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use super::{AlertSummary, DispatchOutcome, NotificationDispatcher, kind_icon, severity_icon};
use crate::alerts::Alert;
use crate::config::Discord;
use crate::monitors::Severity;

/// Discord rejects messages with more embeds than this
const MAX_EMBEDS_PER_MESSAGE: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl EmbedField {
    fn inline(name: impl ToString, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            inline: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

fn severity_color(severity: Severity) -> u32 {
    match severity {
        Severity::Down => 0x64748b,
        Severity::Critical => 0xdc2626,
        Severity::Warning => 0xf59e0b,
        Severity::Healthy => 0x16a34a,
    }
}

fn build_alert_embed(alert: &Alert) -> Embed {
    let mut fields = vec![EmbedField::inline("Status", alert.status)];

    if let Some(metrics) = &alert.metrics {
        let usage = [("💻 CPU", metrics.cpu), ("🧠 RAM", metrics.ram), ("💾 Disk", metrics.disk)];
        fields.extend(
            usage
                .into_iter()
                .filter_map(|(name, value)| value.map(|value| EmbedField::inline(name, format!("{value:.1}%")))),
        );
    }

    Embed {
        title: Some(format!(
            "{} {} {}",
            severity_icon(alert.severity),
            kind_icon(alert.kind),
            alert.name
        )),
        description: Some(alert.message.clone()),
        color: Some(severity_color(alert.severity)),
        fields,
        footer: Some(EmbedFooter {
            text: format!("Target: {} | {}", alert.target_id, alert.severity),
        }),
        timestamp: Some(alert.timestamp.to_rfc3339()),
    }
}

/// Posts alert batches to a Discord webhook.
#[derive(Debug, Clone)]
pub struct DiscordDispatcher {
    client: Client,
    config: Discord,
}

impl DiscordDispatcher {
    pub fn new(client: Client, config: Discord) -> Self {
        Self { client, config }
    }

    /// One message per ten alerts; the first carries the headline and mention.
    pub fn build_messages(&self, alerts: &[Alert]) -> Vec<Message> {
        let Some(summary) = AlertSummary::of(alerts) else {
            return Vec::new();
        };

        alerts
            .chunks(MAX_EMBEDS_PER_MESSAGE)
            .enumerate()
            .map(|(index, chunk)| {
                let mut builder = chunk
                    .iter()
                    .fold(MessageBuilder::new(), |builder, alert| {
                        builder.add_embed(build_alert_embed(alert))
                    });

                if index == 0 {
                    let mut content = format!("{} ({} issue(s))", summary.headline(), alerts.len());
                    if let Some(user_id) = &self.config.user_id {
                        content.push_str(&format!(" <@{user_id}>"));
                    }
                    builder = builder.content(content);
                }
                builder.build()
            })
            .collect()
    }

    #[instrument(skip(self, message))]
    pub async fn send_message(&self, message: &Message) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.config.url)
            .json(message)
            .send()
            .await
            .context("failed to send Discord message")?;

        let status = response.status();
        if !status.is_success() {
            if let Ok(error_text) = response.text().await {
                error!("Discord API error response: {}", error_text);
            }
            bail!("Discord message failed with status: {status}");
        }

        info!("Successfully sent Discord message");
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for DiscordDispatcher {
    async fn dispatch(&self, alerts: &[Alert]) -> anyhow::Result<DispatchOutcome> {
        let messages = self.build_messages(alerts);
        if messages.is_empty() {
            return Ok(DispatchOutcome::default());
        }

        for message in &messages {
            self.send_message(message).await?;
        }
        Ok(DispatchOutcome::delivered())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetricsSnapshot, RunState, Target, TargetStatus};
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn critical_alert(id: &str) -> Alert {
        let status = TargetStatus::for_target(&Target::new(id, format!("host-{id}")), RunState::Running)
            .with_metrics(MetricsSnapshot::with_usage(Some(10.0), Some(20.0), Some(92.0)));
        Alert::new(&status, Severity::Critical, Utc::now())
    }

    fn dispatcher(url: String, user_id: Option<&str>) -> DiscordDispatcher {
        DiscordDispatcher::new(
            Client::new(),
            Discord {
                url,
                user_id: user_id.map(str::to_string),
            },
        )
    }

    #[test]
    fn test_messages_are_chunked() {
        let alerts: Vec<Alert> = (0..23).map(|i| critical_alert(&i.to_string())).collect();
        let messages = dispatcher("http://unused".to_string(), Some("42")).build_messages(&alerts);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].embeds.len(), 10);
        assert_eq!(messages[2].embeds.len(), 3);
        assert_eq!(
            messages[0].content.as_deref(),
            Some("🔥 CRITICAL: Server Alert (23 issue(s)) <@42>")
        );
        assert!(messages[1].content.is_none());
    }

    #[test]
    fn test_embed_lists_present_metrics() {
        let embed = build_alert_embed(&critical_alert("1"));

        assert_eq!(embed.description.as_deref(), Some("Disk: 92.0%"));
        let names: Vec<&str> = embed.fields.iter().map(|field| field.name.as_str()).collect();
        assert_eq!(names, vec!["Status", "💻 CPU", "🧠 RAM", "💾 Disk"]);
    }

    #[tokio::test]
    async fn test_dispatch_posts_to_webhook() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/discord"))
            .and(body_partial_json(serde_json::json!({
                "content": "🔥 CRITICAL: Server Alert (1 issue(s))"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = dispatcher(format!("{}/discord", mock_server.uri()), None)
            .dispatch(&[critical_alert("1")])
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::delivered());
    }

    #[tokio::test]
    async fn test_dispatch_reports_rejections() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad embed"))
            .mount(&mock_server)
            .await;

        let result = dispatcher(mock_server.uri(), None)
            .dispatch(&[critical_alert("1")])
            .await;
        assert!(result.is_err());
    }
}
