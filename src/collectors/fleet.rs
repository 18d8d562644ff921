use std::sync::Arc;

use async_trait::async_trait;
use tracing::{instrument, trace};

use super::Collector;
use super::cloud::CloudCollector;
use super::command::CommandRunner;
use super::docker::DockerCollector;
use super::ssh::SshCollector;
use crate::config::Config;
use crate::{RunState, Target, TargetKind, TargetStatus};

/// Routes each target to the collector family its capabilities allow.
///
/// - containers go to the container engine
/// - hosts with an instance id are described through the cloud API first
/// - hosts with SSH credentials are sampled over SSH, otherwise the cloud
///   API's CPU metric is used
#[derive(Clone)]
pub struct FleetCollector {
    ssh: SshCollector,
    cloud: CloudCollector,
    docker: DockerCollector,
}

impl FleetCollector {
    pub fn new(ssh: SshCollector, cloud: CloudCollector, docker: DockerCollector) -> Self {
        Self { ssh, cloud, docker }
    }

    pub fn from_config(runner: Arc<dyn CommandRunner>, config: &Config) -> Self {
        Self::new(
            SshCollector::new(runner.clone(), config.ssh.clone()),
            CloudCollector::new(runner.clone(), config.cloud.clone()),
            DockerCollector::new(runner, config.containers.clone()),
        )
    }
}

#[async_trait]
impl Collector for FleetCollector {
    #[instrument(skip_all, fields(target = %target.id))]
    async fn collect(&self, target: &Target) -> anyhow::Result<TargetStatus> {
        if target.kind() == TargetKind::Container {
            return self.docker.collect(target).await;
        }

        let mut status = match target.instance_id.as_deref() {
            Some(instance_id) => self.cloud.describe_status(target, instance_id).await,
            None => TargetStatus::for_target(target, RunState::Unknown),
        };

        if let Some(credentials) = target.ssh_credentials() {
            match self.ssh.sample(credentials).await {
                Ok(metrics) => {
                    status.status = RunState::Running;
                    status.metrics = Some(metrics);
                }
                Err(e) => {
                    status.status = RunState::Unreachable;
                    status.error = Some(format!("SSH Error: {e}"));
                }
            }
        } else if let Some(instance_id) = target.instance_id.as_deref() {
            status.metrics = self.cloud.cloudwatch_metrics(instance_id).await;
        } else {
            trace!("target {} has no collector capability", target.id);
        }

        Ok(status)
    }
}
