//! Restart behaviour with the JSON file backend
//!
//! These tests verify that:
//! - The snapshot cache survives a restart unchanged
//! - Alert deduplication survives a restart
//! - Corrupt state files fall back to empty state

use std::sync::Arc;

use fleet_monitor::{
    actors::PollScheduler,
    storage::{
        StorageBackend,
        json::{ALERT_STATE_FILE, CACHE_FILE, JsonFileBackend},
    },
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::*;

#[tokio::test]
async fn test_restart_restores_cache_and_alert_state() {
    let dir = tempdir().unwrap();
    let collector = FakeCollector::new();
    collector.set("a", Probe::usage(10.0, 20.0, 30.0));
    collector.set("b", Probe::usage(10.0, 20.0, 92.0));

    let first_dispatcher = RecordingDispatcher::new();
    let ctx = context(
        registry(&["a", "b"]),
        collector.clone(),
        first_dispatcher.clone(),
        Arc::new(JsonFileBackend::new(dir.path()).await.unwrap()),
    );
    let first_store = ctx.store.clone();
    let mut first = PollScheduler::load(ctx).await;
    first.run_cycle().await;
    assert_eq!(first_dispatcher.batches().len(), 1);

    let written = first_store.get();
    assert!(dir.path().join(CACHE_FILE).exists());
    assert!(dir.path().join(ALERT_STATE_FILE).exists());
    drop(first);

    // Second process over the same directory
    let second_dispatcher = RecordingDispatcher::new();
    let ctx = context(
        registry(&["a", "b"]),
        collector,
        second_dispatcher.clone(),
        Arc::new(JsonFileBackend::new(dir.path()).await.unwrap()),
    );
    let second_store = ctx.store.clone();
    let mut second = PollScheduler::load(ctx).await;

    assert_eq!(*second_store.get(), *written);
    assert!(second.tracker().to_document().contains_key("b_critical"));

    let report = second.run_cycle().await;
    assert_eq!(report.alerts, 0);
    assert!(second_dispatcher.batches().is_empty());
}

#[tokio::test]
async fn test_alert_state_file_format() {
    let dir = tempdir().unwrap();
    let collector = FakeCollector::new();
    collector.set("web", Probe::usage(10.0, 20.0, 92.0));
    let backend = Arc::new(JsonFileBackend::new(dir.path()).await.unwrap());

    let ctx = context(
        registry(&["web"]),
        collector,
        RecordingDispatcher::new(),
        backend.clone(),
    );
    PollScheduler::load(ctx).await.run_cycle().await;

    let raw = std::fs::read_to_string(backend.alert_state_path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(value["web_critical"]["timestamp"].is_i64());
    assert_eq!(value["web_critical"]["resolved"], false);

    let raw = std::fs::read_to_string(backend.cache_path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["targets"][0]["id"], "web");
    assert!(value["lastUpdate"].is_string());
}

#[tokio::test]
async fn test_corrupt_files_start_empty() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join(CACHE_FILE), "{ not json").unwrap();
    std::fs::write(dir.path().join(ALERT_STATE_FILE), "[]").unwrap();

    let backend = Arc::new(JsonFileBackend::new(dir.path()).await.unwrap());
    assert!(backend.load_snapshot().await.is_err());

    let collector = FakeCollector::new();
    collector.set("a", Probe::usage(10.0, 20.0, 92.0));
    let dispatcher = RecordingDispatcher::new();
    let ctx = context(registry(&["a"]), collector, dispatcher.clone(), backend.clone());
    let store = ctx.store.clone();
    let mut scheduler = PollScheduler::load(ctx).await;

    assert!(store.get().is_empty());
    assert!(scheduler.tracker().is_empty());

    scheduler.run_cycle().await;
    assert_eq!(dispatcher.batches().len(), 1);

    // The next write replaced the corrupt documents
    assert!(backend.load_snapshot().await.unwrap().is_some());
    assert!(backend.load_alert_state().await.unwrap().is_some());
}
