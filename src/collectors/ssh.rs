//! Remote-shell sampling of CPU, memory and root filesystem usage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{instrument, trace};

use super::Collector;
use super::command::CommandRunner;
use crate::config::SshConfig;
use crate::util::parse_percent;
use crate::{MetricsSnapshot, RunState, SshCredentials, Target, TargetStatus};

/// Prints one `key=value` line per metric so that a failing probe only loses
/// its own line.
const PROBE_SCRIPT: &str = concat!(
    r#"echo "cpu=$(top -bn1 | grep 'Cpu(s)' | sed 's/.*, *\([0-9.]*\)%* id.*/\1/' | awk '{print 100 - $1}')"; "#,
    r#"echo "ram=$(free | grep Mem | awk '{print ($3/$2) * 100.0}')"; "#,
    r#"echo "disk=$(df -h / | tail -1 | awk '{print $5}' | sed 's/%//')"; "#,
    r#"echo "space=$(df -h / | tail -1 | awk '{print $2,$3,$4}')""#,
);

#[derive(Clone)]
pub struct SshCollector {
    runner: Arc<dyn CommandRunner>,
    config: SshConfig,
}

impl SshCollector {
    pub fn new(runner: Arc<dyn CommandRunner>, config: SshConfig) -> Self {
        Self { runner, config }
    }

    fn args(&self, credentials: &SshCredentials<'_>) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];
        for option in &self.config.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args.push("-i".to_string());
        args.push(credentials.private_key.display().to_string());
        if let Some(port) = credentials.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.push(format!("{}@{}", credentials.username, credentials.host));
        args.push(PROBE_SCRIPT.to_string());
        args
    }

    /// Run the probe script on the remote host.
    #[instrument(skip_all, fields(host = credentials.host))]
    pub async fn sample(&self, credentials: SshCredentials<'_>) -> anyhow::Result<MetricsSnapshot> {
        let output = self
            .runner
            .run(
                &self.config.binary,
                &self.args(&credentials),
                Duration::from_secs(self.config.command_timeout_secs),
            )
            .await?
            .into_stdout()?;

        trace!("probe output: {output:?}");
        Ok(parse_probe_output(&output))
    }
}

fn parse_probe_output(output: &str) -> MetricsSnapshot {
    let mut metrics = MetricsSnapshot::empty(Utc::now());

    for (key, value) in output.lines().filter_map(|line| line.split_once('=')) {
        match key.trim() {
            "cpu" => metrics.cpu = parse_percent(value),
            "ram" => metrics.ram = parse_percent(value),
            "disk" => metrics.disk = parse_percent(value),
            "space" => {
                let mut parts = value.split_whitespace().map(str::to_string);
                metrics.disk_total = parts.next();
                metrics.disk_used = parts.next();
                metrics.disk_free = parts.next();
            }
            _ => {}
        }
    }

    metrics
}

#[async_trait]
impl Collector for SshCollector {
    async fn collect(&self, target: &Target) -> anyhow::Result<TargetStatus> {
        let Some(credentials) = target.ssh_credentials() else {
            return Ok(TargetStatus::for_target(target, RunState::Unknown));
        };

        Ok(match self.sample(credentials).await {
            Ok(metrics) => TargetStatus::for_target(target, RunState::Running).with_metrics(metrics),
            Err(e) => TargetStatus::failed(target, RunState::Unreachable, format!("SSH Error: {e}")),
        })
    }
}
