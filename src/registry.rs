//! Target registries
//!
//! The scheduler asks its registry for the current target list at the start of
//! every cycle and never mutates what it gets back.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::Target;
use crate::collectors::DockerCollector;

#[async_trait]
pub trait TargetRegistry: Send + Sync {
    /// Targets to monitor, in display order.
    async fn list_targets(&self) -> anyhow::Result<Vec<Target>>;
}

/// Fixed target list, usually from the configuration file.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    targets: Vec<Target>,
}

impl StaticRegistry {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl TargetRegistry for StaticRegistry {
    async fn list_targets(&self) -> anyhow::Result<Vec<Target>> {
        Ok(self.targets.clone())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default, alias = "targets")]
    servers: Vec<Target>,
}

/// Partial update of a stored target.
///
/// Only the fields listed here can change; `id` and `createdAt` are rejected
/// when deserializing. For optional fields, an explicit `null` clears the
/// value while an absent field leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub display_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub host: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub port: Option<Option<u16>>,
    #[serde(default, deserialize_with = "nullable")]
    pub username: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub private_key: Option<Option<PathBuf>>,
    #[serde(default, deserialize_with = "nullable")]
    pub instance_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub container: Option<Option<String>>,
    #[serde(default)]
    pub public: Option<bool>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TargetPatch {
    pub fn apply(self, target: &mut Target) {
        fn set<T>(field: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *field = value;
            }
        }

        set(&mut target.name, self.name);
        set(&mut target.display_name, self.display_name);
        set(&mut target.host, self.host);
        set(&mut target.port, self.port);
        set(&mut target.username, self.username);
        set(&mut target.private_key, self.private_key);
        set(&mut target.instance_id, self.instance_id);
        set(&mut target.container, self.container);
        set(&mut target.public, self.public);
    }
}

/// Targets stored in a JSON document (`{ "servers": [...] }`), re-read on
/// every listing so edits take effect on the next cycle.
#[derive(Debug)]
pub struct FileRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> anyhow::Result<RegistryDocument> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("registry {} does not exist yet", self.path.display());
                return Ok(RegistryDocument::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()));
            }
        };

        serde_json::from_slice(&content)
            .with_context(|| format!("invalid registry file {}", self.path.display()))
    }

    async fn save(&self, document: &RegistryDocument) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, serde_json::to_vec_pretty(document)?)
            .await
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))
    }

    /// Store a new target. An empty id is replaced by a generated one.
    #[instrument(skip_all, fields(name = %target.name))]
    pub async fn add(&self, mut target: Target) -> anyhow::Result<Target> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;

        if target.id.is_empty() {
            target.id = Utc::now().timestamp_millis().to_string();
        }
        if document.servers.iter().any(|existing| existing.id == target.id) {
            bail!("a target with id {} already exists", target.id);
        }
        target.created_at = Some(Utc::now());

        document.servers.push(target.clone());
        self.save(&document).await?;

        info!("added target {}", target.id);
        Ok(target)
    }

    /// Apply `patch` to the target with `id`. `Ok(None)` if there is none.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: TargetPatch) -> anyhow::Result<Option<Target>> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;

        let Some(target) = document.servers.iter_mut().find(|target| target.id == id) else {
            return Ok(None);
        };
        patch.apply(target);
        let updated = target.clone();

        self.save(&document).await?;
        Ok(Some(updated))
    }

    /// Remove the target with `id`, returning whether it existed.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;

        let before = document.servers.len();
        document.servers.retain(|target| target.id != id);
        if document.servers.len() == before {
            return Ok(false);
        }

        self.save(&document).await?;
        Ok(true)
    }
}

#[async_trait]
impl TargetRegistry for FileRegistry {
    async fn list_targets(&self) -> anyhow::Result<Vec<Target>> {
        Ok(self.load().await?.servers)
    }
}

/// Every container of the local engine, running or not.
#[derive(Clone)]
pub struct ContainerDiscovery {
    docker: DockerCollector,
}

impl ContainerDiscovery {
    pub fn new(docker: DockerCollector) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl TargetRegistry for ContainerDiscovery {
    async fn list_targets(&self) -> anyhow::Result<Vec<Target>> {
        match self.docker.list_containers().await {
            Ok(containers) => Ok(containers.iter().map(|c| c.to_target()).collect()),
            Err(e) => {
                debug!("container engine not available: {e:#}");
                Ok(Vec::new())
            }
        }
    }
}

/// Concatenation of several registries.
///
/// A failing source is logged and contributes nothing. Ids listed by an
/// earlier source win over later duplicates.
#[derive(Clone, Default)]
pub struct CompositeRegistry {
    sources: Vec<Arc<dyn TargetRegistry>>,
}

impl CompositeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: Arc<dyn TargetRegistry>) -> Self {
        self.sources.push(source);
        self
    }
}

#[async_trait]
impl TargetRegistry for CompositeRegistry {
    async fn list_targets(&self) -> anyhow::Result<Vec<Target>> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        for (index, source) in self.sources.iter().enumerate() {
            let listed = match source.list_targets().await {
                Ok(listed) => listed,
                Err(e) => {
                    warn!("target source #{index} failed: {e:#}");
                    continue;
                }
            };

            for target in listed {
                if seen.insert(target.id.clone()) {
                    targets.push(target);
                } else {
                    warn!("ignoring duplicate target id {}", target.id);
                }
            }
        }

        Ok(targets)
    }
}
