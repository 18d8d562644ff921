//! Container state and resource usage through the `docker` CLI.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument, warn};

use super::Collector;
use super::command::CommandRunner;
use crate::config::ContainerConfig;
use crate::util::parse_percent;
use crate::{ContainerDetails, MetricsSnapshot, RunState, Target, TargetDetails, TargetStatus};

const LIST_FORMAT: &str = "{{.ID}}|{{.Names}}|{{.State}}|{{.Status}}|{{.Image}}";
const INSPECT_FORMAT: &str = "{{.Id}}|{{.State.Status}}|{{.Config.Image}}";
const STATS_FORMAT: &str = "{{.CPUPerc}}|{{.MemPerc}}|{{.MemUsage}}";

/// One row of `docker ps -a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub state: String,
    pub status: String,
    pub image: String,
}

impl ContainerSummary {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split('|').map(str::trim);
        let summary = Self {
            id: fields.next().filter(|id| !id.is_empty())?.to_string(),
            name: fields.next()?.to_string(),
            state: fields.next()?.to_lowercase(),
            status: fields.next().unwrap_or_default().to_string(),
            image: fields.next().unwrap_or_default().to_string(),
        };
        Some(summary)
    }

    /// Monitoring target for this container, keyed by container id.
    pub fn to_target(&self) -> Target {
        let mut target = Target::new(&self.id, &self.name);
        target.container = Some(self.id.clone());
        target
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ContainerUsage {
    cpu: Option<f64>,
    memory: Option<f64>,
}

#[derive(Clone)]
pub struct DockerCollector {
    runner: Arc<dyn CommandRunner>,
    config: ContainerConfig,
}

impl DockerCollector {
    pub fn new(runner: Arc<dyn CommandRunner>, config: ContainerConfig) -> Self {
        Self { runner, config }
    }

    async fn docker(&self, args: &[&str]) -> anyhow::Result<String> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        self.runner
            .run(
                &self.config.binary,
                &args,
                Duration::from_secs(self.config.command_timeout_secs),
            )
            .await?
            .into_stdout()
    }

    /// Every container known to the engine, stopped ones included.
    #[instrument(skip(self))]
    pub async fn list_containers(&self) -> anyhow::Result<Vec<ContainerSummary>> {
        let stdout = self.docker(&["ps", "-a", "--format", LIST_FORMAT]).await?;
        Ok(stdout.lines().filter_map(ContainerSummary::parse).collect())
    }

    async fn inspect(&self, container: &str) -> anyhow::Result<ContainerDetails> {
        let stdout = self
            .docker(&["inspect", "--format", INSPECT_FORMAT, container])
            .await?;

        let line = stdout.lines().next().unwrap_or_default();
        let mut fields = line.split('|').map(str::trim);
        let (Some(id), Some(state)) = (fields.next(), fields.next()) else {
            bail!("unexpected inspect output: {line:?}");
        };

        Ok(ContainerDetails {
            container_id: id.to_string(),
            state: state.to_lowercase(),
            image: fields.next().filter(|image| !image.is_empty()).map(str::to_string),
            status: None,
        })
    }

    async fn usage(&self, container: &str) -> anyhow::Result<(ContainerUsage, Option<String>)> {
        let stdout = self
            .docker(&["stats", container, "--no-stream", "--format", STATS_FORMAT])
            .await?;

        let line = stdout.lines().next().context("empty stats output")?;
        let mut fields = line.split('|').map(str::trim);
        let usage = ContainerUsage {
            cpu: fields.next().and_then(parse_percent),
            memory: fields.next().and_then(parse_percent),
        };
        let memory_usage = fields
            .next()
            .filter(|raw| !raw.is_empty())
            .map(str::to_string);

        Ok((usage, memory_usage))
    }

    async fn disk(&self, container: &str, metrics: &mut MetricsSnapshot) -> anyhow::Result<()> {
        let stdout = self.docker(&["exec", container, "df", "-h", "/"]).await?;

        // Filesystem Size Used Avail Use% Mounted-on
        let line = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .context("empty df output")?;
        let columns: Vec<&str> = line.split_whitespace().collect();
        let [_, size, used, avail, percent, ..] = columns.as_slice() else {
            bail!("unexpected df output: {line:?}");
        };

        metrics.disk = parse_percent(percent);
        metrics.disk_total = Some(size.to_string());
        metrics.disk_used = Some(used.to_string());
        metrics.disk_free = Some(avail.to_string());
        Ok(())
    }

    async fn metrics(&self, container: &str) -> Option<MetricsSnapshot> {
        let (usage, memory_usage) = match self.usage(container).await {
            Ok(usage) => usage,
            Err(e) => {
                warn!("failed to read stats of container {container}: {e:#}");
                return None;
            }
        };

        let mut metrics = MetricsSnapshot {
            cpu: usage.cpu,
            ram: usage.memory,
            memory_usage,
            ..MetricsSnapshot::empty(Utc::now())
        };

        if let Err(e) = self.disk(container, &mut metrics).await {
            debug!("no disk usage for container {container}: {e:#}");
        }

        Some(metrics)
    }
}

#[async_trait]
impl Collector for DockerCollector {
    async fn collect(&self, target: &Target) -> anyhow::Result<TargetStatus> {
        let container = target.container.as_deref().unwrap_or(&target.id);

        let details = match self.inspect(container).await {
            Ok(details) => details,
            Err(e) => {
                return Ok(TargetStatus::failed(
                    target,
                    RunState::Error,
                    format!("Docker Error: {e}"),
                ));
            }
        };

        let mut status =
            TargetStatus::for_target(target, RunState::from_container_state(&details.state));
        if status.status == RunState::Running {
            status.metrics = self.metrics(container).await;
        }
        status.details = Some(TargetDetails::Container(details));
        Ok(status)
    }
}
