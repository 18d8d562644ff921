//! Fakes for the scheduler's collaborators

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use fleet_monitor::{
    MetricsSnapshot, RunState, Target, TargetStatus,
    actors::{MonitorContext, SchedulerSettings},
    alerts::{Alert, AlertStateDocument},
    cache::{SnapshotCache, SnapshotStore},
    collectors::Collector,
    notify::{DispatchOutcome, NotificationDispatcher},
    registry::{StaticRegistry, TargetRegistry},
    storage::{StorageBackend, StorageError, StorageResult, memory::MemoryBackend},
};

/// What the fake collector does for one target id
#[derive(Debug, Clone)]
pub enum Probe {
    Usage {
        cpu: Option<f64>,
        ram: Option<f64>,
        disk: Option<f64>,
    },
    State(RunState),
    Fail(String),
    Panic,
    Hang,
}

impl Probe {
    pub fn usage(cpu: f64, ram: f64, disk: f64) -> Self {
        Probe::Usage {
            cpu: Some(cpu),
            ram: Some(ram),
            disk: Some(disk),
        }
    }
}

/// Collector whose answers can be changed between cycles
#[derive(Debug, Default)]
pub struct FakeCollector {
    probes: Mutex<HashMap<String, Probe>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, id: &str, probe: Probe) {
        self.probes.lock().unwrap().insert(id.to_string(), probe);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Collector for FakeCollector {
    async fn collect(&self, target: &Target) -> anyhow::Result<TargetStatus> {
        self.calls.lock().unwrap().push(target.id.clone());
        let probe = self.probes.lock().unwrap().get(&target.id).cloned();

        match probe.unwrap_or(Probe::State(RunState::Running)) {
            Probe::Usage { cpu, ram, disk } => Ok(TargetStatus::for_target(target, RunState::Running)
                .with_metrics(MetricsSnapshot::with_usage(cpu, ram, disk))),
            Probe::State(state) => Ok(TargetStatus::for_target(target, state)),
            Probe::Fail(message) => bail!("{message}"),
            Probe::Panic => panic!("collector bug"),
            Probe::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(TargetStatus::for_target(target, RunState::Running))
            }
        }
    }
}

/// Dispatcher that records every batch it was handed
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    batches: Mutex<Vec<Vec<Alert>>>,
    fail: bool,
}

impl RecordingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn batches(&self) -> Vec<Vec<Alert>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, alerts: &[Alert]) -> anyhow::Result<DispatchOutcome> {
        self.batches.lock().unwrap().push(alerts.to_vec());
        if self.fail {
            bail!("mail relay refused connection");
        }
        Ok(DispatchOutcome::delivered())
    }
}

/// Storage where every operation fails
#[derive(Debug, Default)]
pub struct BrokenStorage;

fn broken() -> StorageError {
    StorageError::Backend("read-only file system".to_string())
}

#[async_trait]
impl StorageBackend for BrokenStorage {
    async fn load_snapshot(&self) -> StorageResult<Option<SnapshotCache>> {
        Err(broken())
    }

    async fn save_snapshot(&self, _cache: &SnapshotCache) -> StorageResult<()> {
        Err(broken())
    }

    async fn load_alert_state(&self) -> StorageResult<Option<AlertStateDocument>> {
        Err(broken())
    }

    async fn save_alert_state(&self, _document: &AlertStateDocument) -> StorageResult<()> {
        Err(broken())
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

pub fn host(id: &str) -> Target {
    Target::new(id, format!("host-{id}"))
}

pub fn registry(ids: &[&str]) -> Arc<dyn TargetRegistry> {
    Arc::new(StaticRegistry::new(ids.iter().map(|id| host(id)).collect()))
}

pub fn context(
    registry: Arc<dyn TargetRegistry>,
    collector: Arc<dyn Collector>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    storage: Arc<dyn StorageBackend>,
) -> MonitorContext {
    MonitorContext {
        registry,
        collector,
        dispatcher,
        storage,
        store: Arc::new(SnapshotStore::default()),
        settings: SchedulerSettings {
            collect_timeout: Duration::from_millis(250),
            ..SchedulerSettings::default()
        },
    }
}

pub fn memory_context(
    ids: &[&str],
    collector: Arc<dyn Collector>,
    dispatcher: Arc<dyn NotificationDispatcher>,
) -> MonitorContext {
    context(registry(ids), collector, dispatcher, Arc::new(MemoryBackend::new()))
}
