mod common;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;

use common::Harness;
use helpline::config::SourceConfig;
use helpline::error::SourceError;
use helpline::retry::RetryPolicy;
use helpline::source::{HttpSource, Pages, SourceClient};
use helpline::sync::{Outcome, Trigger};

fn solutions() -> Vec<Value> {
  let body = "Open the VPN client, sign out, clear cached credentials, reconnect using the \
              corporate gateway address and confirm the tunnel stays up for five minutes.";
  vec![
    json!({ "id": "101", "title": "VPN drops", "content": body, "category": "Network",
            "lastModified": "2024-06-01T08:00:00Z", "tags": "vpn, remote" }),
    json!({ "id": 102, "name": "VPN slow", "body": format!("{body} Check bandwidth."),
            "category": "networking", "updatedAt": "2024-06-02T08:00:00Z", "tags": ["vpn"] }),
    json!({ "id": "103", "title": "No timestamp", "content": body }),
    json!({ "id": "104", "title": "VPN certificate", "content": format!("{body} Renew the cert."),
            "category": "security", "lastModified": "2024-06-03T08:00:00Z" }),
  ]
}

async fn list(
  State(entries): State<Arc<Vec<Value>>>,
  headers: HeaderMap,
  Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
  if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer secret") {
    return Err(StatusCode::UNAUTHORIZED);
  }

  let since = params
    .get("modifiedSince")
    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
    .map(|ts| ts.with_timezone(&Utc));
  let offset: usize = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
  let limit: usize = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(100);

  let matching: Vec<Value> = entries
    .iter()
    .filter(|entry| {
      let modified = entry.get("lastModified").or_else(|| entry.get("updatedAt")).and_then(Value::as_str);
      match (since, modified.and_then(|m| DateTime::parse_from_rfc3339(m).ok())) {
        (Some(since), Some(ts)) => ts >= since,
        _ => true,
      }
    })
    .cloned()
    .collect();

  let page: Vec<Value> = matching.iter().skip(offset).take(limit).cloned().collect();
  Ok(Json(json!({ "solutions": page, "totalCount": matching.len() })))
}

async fn unavailable() -> StatusCode {
  StatusCode::SERVICE_UNAVAILABLE
}

async fn serve() -> String {
  let app = Router::new()
    .route("/api/solutions", get(list))
    .route("/down/solutions", get(unavailable))
    .with_state(Arc::new(solutions()));

  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
  format!("http://{addr}")
}

fn source_config(base_url: &str, path: &str, api_key: Option<&str>) -> SourceConfig {
  SourceConfig {
    base_url: Some(base_url.to_string()),
    api_key: api_key.map(str::to_string),
    solutions_path: path.to_string(),
    page_size: 2,
    page_delay_ms: 0,
    ..SourceConfig::default()
  }
}

#[tokio::test]
async fn test_pages_walk_the_feed_and_reject_bad_entries() {
  let base = serve().await;
  let source = HttpSource::from_config(&source_config(&base, "/api/solutions", Some("secret"))).unwrap();
  let retry = RetryPolicy::immediate(0);

  let mut pages = Pages::new(&source, &retry, None);
  let mut ids = Vec::new();
  let mut rejected = Vec::new();
  while let Some(page) = pages.next().await {
    let page = page.unwrap();
    ids.extend(page.records.iter().map(|r| r.id.clone()));
    rejected.extend(page.rejected.into_iter().map(|r| r.id));
  }

  assert_eq!(pages.fetched(), 2);
  assert_eq!(ids, vec!["101", "102", "104"]);
  assert_eq!(rejected, vec![Some("103".to_string())]);
}

#[tokio::test]
async fn test_fields_are_parsed_leniently() {
  let base = serve().await;
  let source = HttpSource::from_config(&source_config(&base, "api/solutions", Some("secret"))).unwrap();

  let page = source.fetch_page(None, None).await.unwrap();
  let second = &page.records[1];

  assert_eq!(second.id, "102");
  assert_eq!(second.title, "VPN slow");
  assert_eq!(second.category, helpline::models::Category::Network);
  assert_eq!(second.tags, vec!["vpn"]);
  assert_eq!(page.records[0].tags, vec!["vpn", "remote"]);
  assert_eq!(second.url.as_deref(), Some(format!("{base}/solutions/102").as_str()));
}

#[tokio::test]
async fn test_http_errors_are_classified() {
  let base = serve().await;

  let unauthorized = HttpSource::from_config(&source_config(&base, "/api/solutions", None)).unwrap();
  let err = unauthorized.fetch_page(None, None).await.unwrap_err();
  assert!(matches!(err, SourceError::Rejected { status: 401, .. }));

  let down = HttpSource::from_config(&source_config(&base, "/down/solutions", Some("secret"))).unwrap();
  let err = down.fetch_page(None, None).await.unwrap_err();
  assert!(matches!(err, SourceError::Unavailable(_)));
}

#[tokio::test]
async fn test_full_sync_over_http() {
  let base = serve().await;
  let source = Arc::new(HttpSource::from_config(&source_config(&base, "/api/solutions", Some("secret"))).unwrap());
  let harness = Harness::new(source, 10);

  let report = harness.orchestrator.run(Trigger::Manual).await.unwrap();

  assert_eq!(report.outcome, Outcome::Completed);
  assert_eq!(report.pages, 2);
  assert_eq!(report.indexed, 3);
  assert_eq!(report.integrity_skipped, 1);
  assert_eq!(harness.documents().await, 3);
  assert_eq!(harness.state().cursor.map(|c| c.to_rfc3339()), Some("2024-06-03T08:00:00+00:00".to_string()));
}
