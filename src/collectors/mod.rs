//! Collector adapters
//!
//! A collector turns a [`Target`] into a [`TargetStatus`]. Adapters translate
//! their own failures into a status (`unreachable`, `error`, absent metrics)
//! wherever they can; an `Err` is reserved for failures the adapter could not
//! classify, and the scheduler converts it into an `error` status.
//!
//! All adapters reach the outside world through a [`CommandRunner`].

pub mod cloud;
pub mod command;
pub mod docker;
pub mod fleet;
pub mod ssh;

use async_trait::async_trait;

use crate::{Target, TargetStatus};

pub use cloud::CloudCollector;
pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use docker::{ContainerSummary, DockerCollector};
pub use fleet::FleetCollector;
pub use ssh::SshCollector;

#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self, target: &Target) -> anyhow::Result<TargetStatus>;
}
