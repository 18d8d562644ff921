//! End-to-end cycles over fake collaborators
//!
//! These tests verify that:
//! - Healthy targets never produce alerts
//! - Alerts are deduplicated within the re-notification window
//! - Recovery resolves alerts and a relapse alerts immediately
//! - Registry edits take effect on the next cycle

use std::sync::Arc;
use std::time::Duration;

use fleet_monitor::{
    RunState,
    actors::PollScheduler,
    monitors::{Severity, classify},
    registry::{CompositeRegistry, FileRegistry, StaticRegistry, TargetPatch},
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::*;

#[tokio::test]
async fn test_two_target_lifecycle() {
    let collector = FakeCollector::new();
    collector.set("a", Probe::usage(10.0, 20.0, 30.0));
    collector.set("b", Probe::usage(10.0, 20.0, 92.0));
    let dispatcher = RecordingDispatcher::new();
    let ctx = memory_context(&["a", "b"], collector.clone(), dispatcher.clone());
    let store = ctx.store.clone();
    let mut scheduler = PollScheduler::load(ctx).await;

    // First cycle: one healthy, one critical
    let report = scheduler.run_cycle().await;
    assert_eq!(report.targets, 2);
    assert_eq!(report.alerts, 1);

    let cache = store.get();
    assert_eq!(classify(cache.get("a").unwrap()), Severity::Healthy);
    assert_eq!(classify(cache.get("b").unwrap()), Severity::Critical);

    let batches = dispatcher.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].target_id, "b");
    assert_eq!(batches[0][0].severity, Severity::Critical);
    assert_eq!(batches[0][0].message, "Disk: 92.0%");

    // Same state within the hour: nothing new
    scheduler.run_cycle().await;
    assert_eq!(dispatcher.batches().len(), 1);

    // Recovery resolves without notifying
    collector.set("b", Probe::usage(10.0, 20.0, 50.0));
    let report = scheduler.run_cycle().await;
    assert_eq!(report.alerts, 0);
    assert_eq!(dispatcher.batches().len(), 1);
    let state = scheduler.tracker().to_document();
    assert!(state["b_critical"].resolved);

    // Relapse notifies immediately
    collector.set("b", Probe::usage(10.0, 20.0, 92.0));
    let report = scheduler.run_cycle().await;
    assert_eq!(report.alerts, 1);
    assert_eq!(dispatcher.batches().len(), 2);
    assert!(!scheduler.tracker().to_document()["b_critical"].resolved);
}

#[tokio::test]
async fn test_one_batch_per_cycle() {
    let collector = FakeCollector::new();
    collector.set("a", Probe::State(RunState::Stopped));
    collector.set("b", Probe::usage(10.0, 96.0, 10.0));
    collector.set("c", Probe::usage(10.0, 91.0, 10.0));
    let dispatcher = RecordingDispatcher::new();
    let mut scheduler =
        PollScheduler::load(memory_context(&["a", "b", "c"], collector, dispatcher.clone())).await;

    let report = scheduler.run_cycle().await;
    assert_eq!(report.alerts, 3);

    let batches = dispatcher.batches();
    assert_eq!(batches.len(), 1);
    let severities: Vec<Severity> = batches[0].iter().map(|alert| alert.severity).collect();
    assert_eq!(
        severities,
        vec![Severity::Down, Severity::Critical, Severity::Warning]
    );
}

#[tokio::test]
async fn test_severity_change_alerts_under_new_key() {
    let collector = FakeCollector::new();
    collector.set("a", Probe::usage(10.0, 91.0, 10.0));
    let dispatcher = RecordingDispatcher::new();
    let mut scheduler =
        PollScheduler::load(memory_context(&["a"], collector.clone(), dispatcher.clone())).await;

    scheduler.run_cycle().await;
    collector.set("a", Probe::State(RunState::Stopped));
    scheduler.run_cycle().await;

    let batches = dispatcher.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1][0].severity, Severity::Down);

    let state = scheduler.tracker().to_document();
    assert!(state.contains_key("a_warning"));
    assert!(state.contains_key("a_down"));
}

#[tokio::test]
async fn test_file_registry_edits_apply_next_cycle() {
    let dir = tempdir().unwrap();
    let file = Arc::new(FileRegistry::new(dir.path().join("targets.json")));
    let registry = CompositeRegistry::new()
        .with(Arc::new(StaticRegistry::new(vec![host("static")])))
        .with(file.clone());

    let collector = FakeCollector::new();
    let dispatcher = RecordingDispatcher::new();
    let ctx = context(
        Arc::new(registry),
        collector.clone(),
        dispatcher,
        Arc::new(fleet_monitor::storage::memory::MemoryBackend::new()),
    );
    let store = ctx.store.clone();
    let mut scheduler = PollScheduler::load(ctx).await;

    assert_eq!(scheduler.run_cycle().await.targets, 1);

    file.add(host("dynamic")).await.unwrap();
    assert_eq!(scheduler.run_cycle().await.targets, 2);

    let patch: TargetPatch = serde_json::from_value(serde_json::json!({
        "displayName": "Dynamic box",
        "public": true
    }))
    .unwrap();
    file.update("dynamic", patch).await.unwrap();
    scheduler.run_cycle().await;

    let cache = store.get();
    let dynamic = cache.get("dynamic").unwrap();
    assert_eq!(dynamic.label(), "Dynamic box");
    assert!(dynamic.public);

    assert!(file.remove("dynamic").await.unwrap());
    assert_eq!(scheduler.run_cycle().await.targets, 1);
    assert!(store.get().get("dynamic").is_none());
}

#[tokio::test]
async fn test_handle_serialises_polls() {
    let collector = FakeCollector::new();
    let dispatcher = RecordingDispatcher::new();
    let handle = PollScheduler::start(
        memory_context(&["a", "b"], collector.clone(), dispatcher),
        Duration::from_secs(3600),
    )
    .await;

    let polls = (0..4).map(|_| {
        let handle = handle.clone();
        tokio::spawn(async move { handle.poll_now().await })
    });
    for poll in polls.collect::<Vec<_>>() {
        let report = poll.await.unwrap().unwrap();
        assert_eq!(report.targets, 2);
    }

    // The startup cycle plus four requested ones, each covering both targets
    let calls = collector.calls();
    assert_eq!(calls.len() % 2, 0);
    assert!(calls.len() >= 8);

    handle.stop().await.unwrap();
    assert!(!handle.is_running());
}
