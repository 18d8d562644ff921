//! SMTP alert emails
//!
//! One HTML email per batch, with the subject taken from the batch's worst
//! severity. Delivery goes through the [`Mailer`] seam so the rendering can
//! be tested without an SMTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::Utc;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument};

use super::{AlertSummary, DispatchOutcome, NotificationDispatcher, kind_icon, severity_icon};
use crate::alerts::Alert;
use crate::config::Email;
use crate::monitors::Severity;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

const TEST_SUBJECT: &str = "✅ Fleet Monitor - Test Email";

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: Message) -> anyhow::Result<()>;
}

#[async_trait]
impl Mailer for AsyncSmtpTransport<Tokio1Executor> {
    async fn send(&self, message: Message) -> anyhow::Result<()> {
        AsyncTransport::send(self, message)
            .await
            .context("SMTP delivery failed")?;
        Ok(())
    }
}

pub struct EmailDispatcher {
    mailer: Arc<dyn Mailer>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailDispatcher {
    /// SMTP transport for `config`. Nothing is sent until the first dispatch.
    pub fn new(config: &Email) -> anyhow::Result<Self> {
        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .with_context(|| format!("invalid SMTP host {}", config.host))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Self::with_mailer(Arc::new(transport), config)
    }

    pub fn with_mailer(mailer: Arc<dyn Mailer>, config: &Email) -> anyhow::Result<Self> {
        let sender = config.from.as_deref().unwrap_or(&config.username);
        let from = sender
            .parse::<Mailbox>()
            .with_context(|| format!("invalid sender address {sender:?}"))?;

        let to = config
            .to
            .split(',')
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(|address| {
                address
                    .parse::<Mailbox>()
                    .with_context(|| format!("invalid recipient address {address:?}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        if to.is_empty() {
            bail!("no email recipients configured");
        }

        Ok(Self { mailer, from, to })
    }

    /// Send a fixed message to check the SMTP settings.
    pub async fn send_test(&self) -> anyhow::Result<()> {
        let message = self.message(TEST_SUBJECT, render_test(&self.from, &self.to))?;
        self.mailer.send(message).await
    }

    fn message(&self, subject: &str, html: String) -> anyhow::Result<Message> {
        let builder = self.to.iter().fold(
            Message::builder()
                .from(self.from.clone())
                .subject(subject)
                .header(ContentType::TEXT_HTML),
            |builder, to| builder.to(to.clone()),
        );

        builder.body(html).context("failed to build email")
    }
}

#[async_trait]
impl NotificationDispatcher for EmailDispatcher {
    #[instrument(skip_all, fields(alerts = alerts.len()))]
    async fn dispatch(&self, alerts: &[Alert]) -> anyhow::Result<DispatchOutcome> {
        let Some(summary) = AlertSummary::of(alerts) else {
            return Ok(DispatchOutcome::default());
        };

        let message = self.message(&summary.headline(), render_alerts(alerts, &summary))?;
        self.mailer.send(message).await?;

        info!("sent alert email to {} recipient(s)", self.to.len());
        Ok(DispatchOutcome::delivered())
    }
}

fn render_alerts(alerts: &[Alert], summary: &AlertSummary) -> String {
    let color = format!("#{:06x}", summary.color);

    let rows: String = alerts
        .iter()
        .map(|alert| {
            format!(
                r#"<tr>
<td style="padding: 12px; border-bottom: 1px solid #e2e8f0;"><strong>{} {}</strong></td>
<td style="padding: 12px; border-bottom: 1px solid #e2e8f0;"><span style="background: {color}; color: white; padding: 4px 12px; border-radius: 12px;">{} {}</span></td>
<td style="padding: 12px; border-bottom: 1px solid #e2e8f0; color: #64748b;">{}</td>
</tr>"#,
                kind_icon(alert.kind),
                escape_html(&alert.name),
                severity_icon(alert.severity),
                alert.status,
                escape_html(&alert.message),
            )
        })
        .collect();

    let has = |severity: Severity| alerts.iter().any(|alert| alert.severity == severity);
    let mut actions = Vec::new();
    if has(Severity::Down) {
        actions.push("<li><strong>Check connectivity</strong> - Verify servers are online and accessible</li>");
    }
    if has(Severity::Critical) {
        actions.push("<li><strong>Check disk space</strong> - Free up storage if disk is at 90%+</li>");
        actions.push("<li><strong>Check memory usage</strong> - Restart services or upgrade RAM if needed</li>");
    }
    if has(Severity::Warning) {
        actions.push("<li><strong>Monitor trends</strong> - Watch for escalating resource usage</li>");
    }

    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
<div style="background: {color}; padding: 30px; text-align: center;">
<h1 style="color: white; margin: 0;">{headline}</h1>
<p style="color: white; margin: 10px 0 0 0;">{now}</p>
</div>
<div style="background: #f8fafc; padding: 30px;">
<p>The following systems require immediate attention:</p>
<table style="width: 100%; background: white;">
<thead><tr><th align="left">System</th><th align="left">Status</th><th align="left">Details</th></tr></thead>
<tbody>{rows}</tbody>
</table>
<h3>Recommended Actions:</h3>
<ul>{actions}</ul>
</div>
</div>"#,
        headline = summary.headline(),
        now = Utc::now().to_rfc2822(),
        actions = actions.concat(),
    )
}

fn render_test(from: &Mailbox, to: &[Mailbox]) -> String {
    let recipients = to
        .iter()
        .map(|mailbox| escape_html(&mailbox.to_string()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
<h1>✅ Test Email Successful</h1>
<p>Your email notifications are configured correctly.</p>
<p><strong>From:</strong> {from}<br><strong>To:</strong> {recipients}</p>
<p>You will now receive alerts when targets reach <strong>Warning</strong>, <strong>Critical</strong>, or <strong>Down</strong> states.</p>
<p style="font-size: 12px; color: #94a3b8;">{now}</p>
</div>"#,
        from = escape_html(&from.to_string()),
        now = Utc::now().to_rfc2822(),
    )
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
