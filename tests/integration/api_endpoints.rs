//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - All REST endpoints return the cached data
//! - The public list hides identifiers and errors
//! - Authentication middleware protects the detailed endpoints

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fleet_monitor::{
    RunState, Target,
    actors::{PollScheduler, SchedulerHandle},
    api::{ApiState, spawn_api_server},
    config::ApiConfig,
    registry::StaticRegistry,
    storage::memory::MemoryBackend,
};
use reqwest::StatusCode;
use serde_json::Value;

use crate::helpers::*;

const TOKEN: &str = "test-token";

// Helper to create a scheduler with one cycle done and an API in front of it
async fn spawn_test_api() -> (SocketAddr, SchedulerHandle) {
    let mut website = host("web");
    website.display_name = Some("Website".to_string());
    website.public = true;
    let registry = Arc::new(StaticRegistry::new(vec![website, host("db")]));

    let collector = FakeCollector::new();
    collector.set("web", Probe::usage(10.0, 20.0, 92.0));
    collector.set("db", Probe::Fail("SSH Error: Connection refused".to_string()));

    let ctx = context(
        registry,
        collector,
        RecordingDispatcher::new(),
        Arc::new(MemoryBackend::new()),
    );
    let scheduler = PollScheduler::start(ctx, Duration::from_secs(3600)).await;
    scheduler.poll_now().await.unwrap();

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        auth_token: Some(TOKEN.to_string()),
        enable_cors: true,
    };

    let addr = spawn_api_server(config, ApiState::new(scheduler.clone()))
        .await
        .unwrap();
    (addr, scheduler)
}

async fn get_json(addr: SocketAddr, path: &str) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .get(format!("http://{addr}{path}"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_health_endpoint() {
    let (addr, scheduler) = spawn_test_api().await;

    let response = reqwest::get(format!("http://{addr}/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["targets"], 2);
    assert!(body["lastUpdate"].is_string());

    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_list_targets_includes_severity() {
    let (addr, scheduler) = spawn_test_api().await;

    let (status, body) = get_json(addr, "/api/v1/targets").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let targets = body["targets"].as_array().unwrap();
    assert_eq!(targets[0]["id"], "web");
    assert_eq!(targets[0]["severity"], "critical");
    assert_eq!(targets[1]["id"], "db");
    assert_eq!(targets[1]["status"], RunState::Error.as_str());
    assert_eq!(targets[1]["severity"], "down");

    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_get_single_target() {
    let (addr, scheduler) = spawn_test_api().await;

    let (status, body) = get_json(addr, "/api/v1/targets/db").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "SSH Error: Connection refused");

    let (status, body) = get_json(addr, "/api/v1/targets/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));

    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_public_targets_hide_internals() {
    let (addr, scheduler) = spawn_test_api().await;

    // No token needed
    let response = reqwest::get(format!("http://{addr}/api/v1/public/targets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    let targets = body.as_array().unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0]["name"], "Website");
    assert_eq!(targets[0]["disk"], 92.0);
    assert!(targets[0].get("id").is_none());
    assert!(targets[0].get("error").is_none());

    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_alert_state_endpoint() {
    let (addr, scheduler) = spawn_test_api().await;

    let (status, body) = get_json(addr, "/api/v1/alerts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["alerts"]["web_critical"]["resolved"], false);
    assert!(body["alerts"]["db_down"]["timestamp"].is_i64());

    scheduler.stop().await.unwrap();

    // The cache stays readable, the alert state needs the actor
    let (status, _) = get_json(addr, "/api/v1/targets").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get_json(addr, "/api/v1/alerts").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_auth_required_for_details() {
    let (addr, scheduler) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/api/v1/targets"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(format!("http://{addr}/api/v1/targets"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_open_api_without_token() {
    let registry = Arc::new(StaticRegistry::new(vec![Target::new("bare", "bare")]));
    let ctx = context(
        registry,
        FakeCollector::new(),
        RecordingDispatcher::new(),
        Arc::new(MemoryBackend::new()),
    );
    let scheduler = PollScheduler::start(ctx, Duration::from_secs(3600)).await;
    scheduler.poll_now().await.unwrap();

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        auth_token: None,
        enable_cors: false,
    };
    let addr = spawn_api_server(config, ApiState::new(scheduler.clone()))
        .await
        .unwrap();

    let body: Value = reqwest::get(format!("http://{addr}/api/v1/targets/bare"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["kind"], "host");
    assert_eq!(body["severity"], "healthy");

    scheduler.stop().await.unwrap();
}
