mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use herald::journal::Journal;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use common::{record, DownSource, Harness};
use helpline::config::RetrievalConfig;
use helpline::retrieval::RetrievalEngine;
use helpline::retry::RetryPolicy;
use helpline::server::middleware::REQUEST_ID_HEADER;
use helpline::server::{build_app, AppState};
use helpline::source::StaticSource;

fn app(harness: &Harness) -> Router {
  let retrieval = RetrievalEngine::new(
    harness.provider.clone(),
    harness.index.clone(),
    RetryPolicy::immediate(0),
    RetrievalConfig::default(),
  );
  let journal = Journal::open_with_silent(harness.dir.path().join("journal.jsonl"), true).unwrap();
  let state = AppState::new(harness.orchestrator.clone(), Arc::new(retrieval), "sample".to_string())
    .with_journal(journal);
  build_app(state)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let request = Request::builder().method(method).uri(uri).header("content-type", "application/json");
  let request = match body {
    Some(body) => request.body(Body::from(body.to_string())).unwrap(),
    None => request.body(Body::empty()).unwrap(),
  };

  let response = app.clone().oneshot(request).await.unwrap();
  let status = response.status();
  let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
  let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, json)
}

async fn wait_until_idle(harness: &Harness) {
  for _ in 0..200 {
    if !harness.orchestrator.is_running() {
      return;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("sync run did not finish");
}

#[tokio::test]
async fn test_status_reports_wiring_and_request_id() {
  let harness = Harness::new(Arc::new(StaticSource::sample(5)), 5);
  let app = app(&harness);

  let response = app
    .clone()
    .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  assert!(response.headers().contains_key(REQUEST_ID_HEADER));

  let (_, body) = call(&app, "GET", "/status", None).await;
  assert_eq!(body["status"], "healthy");
  assert_eq!(body["source"], "sample");
  assert_eq!(body["provider"], "test");
  assert_eq!(body["sync_running"], false);
  assert!(body["transaction_id"].is_string());

  let components = body["components"].as_array().unwrap();
  let names: Vec<_> = components.iter().map(|c| c["name"].as_str().unwrap()).collect();
  assert_eq!(names, ["index", "embeddings", "source", "sync"]);
  assert!(components.iter().all(|c| c["healthy"] == true));

  let (status, body) = call(&app, "GET", "/version", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_trigger_then_status_round_trip() {
  let harness = Harness::new(Arc::new(StaticSource::sample(5)), 5);
  let app = app(&harness);

  let (status, body) = call(&app, "POST", "/sync", None).await;
  assert_eq!(status, StatusCode::ACCEPTED);
  let run_id = body["run_id"].as_str().unwrap().to_string();

  wait_until_idle(&harness).await;

  let (status, body) = call(&app, "GET", "/sync/status", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["sync"]["last_report"]["run_id"], run_id.as_str());
  assert_eq!(body["sync"]["last_report"]["outcome"], "completed");
  assert_eq!(body["sync"]["known_documents"], 10);
  assert!(body["sync"]["running"].is_null());

  let (status, body) = call(&app, "GET", "/index/stats", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["stats"]["documents"], 10);

  let (status, body) = call(&app, "GET", "/logs?limit=10&level=info", None).await;
  assert_eq!(status, StatusCode::OK);
  let logs = body["logs"].as_array().unwrap();
  assert!(logs.iter().any(|entry| entry["message"].as_str().unwrap().contains(&run_id)));
}

#[tokio::test]
async fn test_conflicts_while_a_run_is_active() {
  let harness = Harness::new(Arc::new(StaticSource::sample(5)), 5);
  let app = app(&harness);
  harness.provider.hold_next_call();

  let (status, _) = call(&app, "POST", "/sync", None).await;
  assert_eq!(status, StatusCode::ACCEPTED);
  harness.provider.entered.notified().await;

  let (status, body) = call(&app, "POST", "/sync", None).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["errors"][0]["key"], "sync_already_running");

  let (status, _) = call(&app, "POST", "/sync/reset", None).await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (_, body) = call(&app, "GET", "/sync/status", None).await;
  assert!(body["sync"]["running"]["run_id"].is_string());

  let (status, body) = call(&app, "POST", "/sync/cancel", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["cancelled"], true);

  harness.provider.release.notify_one();
  wait_until_idle(&harness).await;

  let (_, body) = call(&app, "GET", "/sync/status", None).await;
  assert_eq!(body["sync"]["last_report"]["outcome"], "cancelled");

  let (_, body) = call(&app, "POST", "/sync/cancel", None).await;
  assert_eq!(body["cancelled"], false);

  let (status, body) = call(&app, "POST", "/sync/reset", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["reset"], true);
}

#[tokio::test]
async fn test_retrieve_endpoint() {
  let harness = Harness::new(Arc::new(StaticSource::sample(5)), 5);
  harness.orchestrator.run(helpline::sync::Trigger::Manual).await.unwrap();
  let app = app(&harness);

  let request = json!({
    "query": "wifi keeps disconnecting",
    "top_k": 2,
    "min_score": -1.0,
    "filters": { "category": "network" }
  });
  let (status, body) = call(&app, "POST", "/retrieve", Some(request)).await;

  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["count"], 2);
  for result in body["results"].as_array().unwrap() {
    assert_eq!(result["metadata"]["category"], "network");
  }

  let (status, body) = call(&app, "POST", "/retrieve", Some(json!({ "query": "  " }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["errors"][0]["key"], "empty_query");
}

#[tokio::test]
async fn test_logs_rejects_unknown_level() {
  let harness = Harness::new(Arc::new(StaticSource::sample(5)), 5);
  let app = app(&harness);

  let (status, body) = call(&app, "GET", "/logs?level=loud", None).await;

  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["errors"][0]["key"], "invalid_level");
}

#[tokio::test]
async fn test_unreachable_source_degrades_status() {
  let harness = Harness::new(Arc::new(DownSource), 5);
  let app = app(&harness);

  let (status, body) = call(&app, "GET", "/status", None).await;

  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "degraded");
  let source = body["components"].as_array().unwrap().iter().find(|c| c["name"] == "source").unwrap();
  assert_eq!(source["healthy"], false);
  assert!(source["message"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_document_lookup() {
  let harness = Harness::new(Arc::new(StaticSource::new(vec![record("S1", 1, "vpn")], 10)), 10);
  harness.orchestrator.run(helpline::sync::Trigger::Manual).await.unwrap();
  let app = app(&harness);

  let (status, body) = call(&app, "GET", "/documents/S1", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["document"]["id"], "S1");
  assert_eq!(body["document"]["metadata"]["title"], "vpn troubleshooting");
  assert_eq!(body["document"]["dimension"], common::DIMENSION);

  let (status, body) = call(&app, "GET", "/documents/missing", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["errors"][0]["key"], "document_not_found");
}

#[tokio::test]
async fn test_source_check_reports_connection() {
  let harness = Harness::new(Arc::new(StaticSource::sample(5)), 5);
  let (status, body) = call(&app(&harness), "GET", "/source/check", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["connected"], true);
  assert!(body.get("error").is_none());

  let harness = Harness::new(Arc::new(DownSource), 5);
  let (status, body) = call(&app(&harness), "GET", "/source/check", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["source"], "down");
  assert_eq!(body["connected"], false);
  assert!(body["error"].as_str().unwrap().contains("connection refused"));
}
