//! Cloud instance state and CPU utilization through the `aws` CLI.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{instrument, warn};

use super::Collector;
use super::command::CommandRunner;
use crate::config::CloudConfig;
use crate::{InstanceDetails, MetricsSnapshot, RunState, Target, TargetDetails, TargetStatus};

/// CloudWatch aggregation window
const METRIC_WINDOW_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesOutput {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Instance {
    instance_id: String,
    state: InstanceState,
    instance_type: Option<String>,
    public_ip_address: Option<String>,
    private_ip_address: Option<String>,
    launch_time: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceState {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Tag {
    key: String,
    value: String,
}

impl From<Instance> for InstanceDetails {
    fn from(instance: Instance) -> Self {
        let name = instance
            .tags
            .into_iter()
            .find(|tag| tag.key == "Name")
            .map(|tag| tag.value)
            .unwrap_or_else(|| "Unnamed".to_string());

        InstanceDetails {
            instance_id: instance.instance_id,
            state: instance.state.name,
            instance_type: instance.instance_type,
            public_ip: instance.public_ip_address,
            private_ip: instance.private_ip_address,
            launch_time: instance.launch_time,
            name: Some(name),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetricStatistics {
    #[serde(default)]
    datapoints: Vec<Datapoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Datapoint {
    timestamp: Option<DateTime<Utc>>,
    average: Option<f64>,
}

#[derive(Clone)]
pub struct CloudCollector {
    runner: Arc<dyn CommandRunner>,
    config: CloudConfig,
}

impl CloudCollector {
    pub fn new(runner: Arc<dyn CommandRunner>, config: CloudConfig) -> Self {
        Self { runner, config }
    }

    async fn aws(&self, args: Vec<String>) -> anyhow::Result<String> {
        let mut args = args;
        args.extend(["--output".to_string(), "json".to_string()]);
        if let Some(region) = &self.config.region {
            args.extend(["--region".to_string(), region.clone()]);
        }
        if let Some(profile) = &self.config.profile {
            args.extend(["--profile".to_string(), profile.clone()]);
        }

        self.runner
            .run(
                &self.config.binary,
                &args,
                Duration::from_secs(self.config.command_timeout_secs),
            )
            .await?
            .into_stdout()
    }

    /// Describe one instance. `Ok(None)` if the API does not know it.
    #[instrument(skip(self))]
    pub async fn instance_details(&self, instance_id: &str) -> anyhow::Result<Option<InstanceDetails>> {
        let stdout = self
            .aws(vec![
                "ec2".to_string(),
                "describe-instances".to_string(),
                "--instance-ids".to_string(),
                instance_id.to_string(),
            ])
            .await?;

        let output: DescribeInstancesOutput =
            serde_json::from_str(&stdout).context("unexpected describe-instances output")?;

        Ok(output
            .reservations
            .into_iter()
            .flat_map(|reservation| reservation.instances)
            .next()
            .map(InstanceDetails::from))
    }

    /// Average CPU utilization over the last five minutes, if reported.
    #[instrument(skip(self, now))]
    pub async fn cpu_utilization(
        &self,
        instance_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<f64>> {
        let start = now - chrono::Duration::seconds(METRIC_WINDOW_SECS);
        let stdout = self
            .aws(vec![
                "cloudwatch".to_string(),
                "get-metric-statistics".to_string(),
                "--namespace".to_string(),
                "AWS/EC2".to_string(),
                "--metric-name".to_string(),
                "CPUUtilization".to_string(),
                "--dimensions".to_string(),
                format!("Name=InstanceId,Value={instance_id}"),
                "--start-time".to_string(),
                start.to_rfc3339_opts(SecondsFormat::Secs, true),
                "--end-time".to_string(),
                now.to_rfc3339_opts(SecondsFormat::Secs, true),
                "--period".to_string(),
                METRIC_WINDOW_SECS.to_string(),
                "--statistics".to_string(),
                "Average".to_string(),
                "--unit".to_string(),
                "Percent".to_string(),
            ])
            .await?;

        let statistics: MetricStatistics =
            serde_json::from_str(&stdout).context("unexpected get-metric-statistics output")?;

        Ok(statistics
            .datapoints
            .into_iter()
            .filter(|point| point.average.is_some_and(f64::is_finite))
            .max_by_key(|point| point.timestamp)
            .and_then(|point| point.average))
    }

    /// Instance details as a status; failures are logged and leave the state unknown.
    pub(crate) async fn describe_status(&self, target: &Target, instance_id: &str) -> TargetStatus {
        let mut status = TargetStatus::for_target(target, RunState::Unknown);
        match self.instance_details(instance_id).await {
            Ok(Some(details)) => {
                status.status = RunState::from_instance_state(&details.state);
                status.details = Some(TargetDetails::Instance(details));
            }
            Ok(None) => warn!("instance {instance_id} of target {} not found", target.id),
            Err(e) => warn!("failed to describe instance {instance_id}: {e:#}"),
        }
        status
    }

    /// CPU-only metrics from CloudWatch; failures are logged and leave metrics absent.
    pub(crate) async fn cloudwatch_metrics(&self, instance_id: &str) -> Option<MetricsSnapshot> {
        let now = Utc::now();
        match self.cpu_utilization(instance_id, now).await {
            Ok(Some(cpu)) => Some(MetricsSnapshot {
                cpu: Some(cpu),
                ..MetricsSnapshot::empty(now)
            }),
            Ok(None) => None,
            Err(e) => {
                warn!("failed to read CloudWatch metrics for {instance_id}: {e:#}");
                None
            }
        }
    }
}

#[async_trait]
impl Collector for CloudCollector {
    async fn collect(&self, target: &Target) -> anyhow::Result<TargetStatus> {
        let Some(instance_id) = target.instance_id.as_deref() else {
            return Ok(TargetStatus::for_target(target, RunState::Unknown));
        };

        let mut status = self.describe_status(target, instance_id).await;
        status.metrics = self.cloudwatch_metrics(instance_id).await;
        Ok(status)
    }
}
