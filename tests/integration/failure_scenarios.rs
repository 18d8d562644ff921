//! Failure tests for the poll scheduler
//!
//! These tests verify that the system handles failures gracefully:
//! - Collector errors, panics and timeouts stay isolated to their target
//! - Persistence failures keep the in-memory state authoritative
//! - Dispatch failures do not undo the tracker's decision

use std::sync::Arc;

use fleet_monitor::{RunState, actors::PollScheduler};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_one_failing_target_leaves_others_untouched() {
    let collector = FakeCollector::new();
    for id in ["a", "b", "c", "d"] {
        collector.set(id, Probe::usage(5.0, 5.0, 5.0));
    }
    collector.set("c", Probe::Fail("Docker Error: no such container".to_string()));

    let ctx = memory_context(&["a", "b", "c", "d"], collector, RecordingDispatcher::new());
    let store = ctx.store.clone();
    let mut scheduler = PollScheduler::load(ctx).await;

    let report = scheduler.run_cycle().await;
    assert_eq!(report.targets, 4);
    assert_eq!(report.issues, 1);

    let cache = store.get();
    assert_eq!(cache.targets.len(), 4);
    for id in ["a", "b", "d"] {
        let status = cache.get(id).unwrap();
        assert_eq!(status.status, RunState::Running);
        assert!(status.error.is_none());
        assert_eq!(status.metrics.as_ref().unwrap().disk, Some(5.0));
    }

    let failed = cache.get("c").unwrap();
    assert_eq!(failed.status, RunState::Error);
    assert_eq!(failed.error.as_deref(), Some("Docker Error: no such container"));
}

#[tokio::test]
async fn test_panicking_and_hanging_collectors_are_contained() {
    let collector = FakeCollector::new();
    collector.set("boom", Probe::Panic);
    collector.set("stuck", Probe::Hang);
    collector.set("fine", Probe::usage(1.0, 2.0, 3.0));

    let ctx = memory_context(&["boom", "stuck", "fine"], collector, RecordingDispatcher::new());
    let store = ctx.store.clone();
    let mut scheduler = PollScheduler::load(ctx).await;

    let report = scheduler.run_cycle().await;
    assert_eq!(report.targets, 3);
    assert_eq!(report.issues, 2);

    let cache = store.get();
    let boom = cache.get("boom").unwrap();
    assert_eq!(boom.status, RunState::Error);
    assert!(boom.error.as_deref().unwrap().contains("collector bug"));

    let stuck = cache.get("stuck").unwrap();
    assert_eq!(stuck.status, RunState::Unreachable);
    assert!(stuck.error.as_deref().unwrap().contains("timed out"));

    assert_eq!(cache.get("fine").unwrap().status, RunState::Running);
}

#[tokio::test]
async fn test_broken_storage_is_not_fatal() {
    let collector = FakeCollector::new();
    collector.set("a", Probe::usage(10.0, 20.0, 92.0));
    let dispatcher = RecordingDispatcher::new();
    let ctx = context(
        registry(&["a"]),
        collector,
        dispatcher.clone(),
        Arc::new(BrokenStorage),
    );
    let store = ctx.store.clone();
    let mut scheduler = PollScheduler::load(ctx).await;

    let report = scheduler.run_cycle().await;
    assert_eq!(report.alerts, 1);
    assert!(store.get().get("a").is_some());

    // The unsaved tracker state still deduplicates in memory
    scheduler.run_cycle().await;
    assert_eq!(dispatcher.batches().len(), 1);
}

#[tokio::test]
async fn test_failed_dispatch_is_not_retried() {
    let collector = FakeCollector::new();
    collector.set("a", Probe::State(RunState::Unreachable));
    let dispatcher = RecordingDispatcher::failing();
    let mut scheduler =
        PollScheduler::load(memory_context(&["a"], collector, dispatcher.clone())).await;

    let report = scheduler.run_cycle().await;
    assert!(report.dispatch_failed);
    assert_eq!(report.issues, 1);

    let report = scheduler.run_cycle().await;
    assert!(!report.dispatch_failed);
    assert_eq!(report.alerts, 0);
    assert_eq!(dispatcher.batches().len(), 1);
}

#[tokio::test]
async fn test_absent_metrics_never_alert() {
    let collector = FakeCollector::new();
    collector.set(
        "a",
        Probe::Usage {
            cpu: None,
            ram: None,
            disk: None,
        },
    );
    collector.set(
        "b",
        Probe::Usage {
            cpu: Some(100.0),
            ram: None,
            disk: None,
        },
    );
    let dispatcher = RecordingDispatcher::new();
    let mut scheduler =
        PollScheduler::load(memory_context(&["a", "b"], collector, dispatcher.clone())).await;

    let report = scheduler.run_cycle().await;
    assert_eq!(report.alerts, 0);
    assert!(dispatcher.batches().is_empty());
}
