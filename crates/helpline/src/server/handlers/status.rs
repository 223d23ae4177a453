//! Status and version endpoint handlers

use axum::{
  extract::{Extension, State},
  response::Json,
};
use chrono::Utc;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::server::middleware::RequestContext;
use crate::server::types::{BaseResponse, ComponentHealth, StatusResponse, VersionResponse};
use crate::server::AppState;
use crate::sync::{Outcome, SyncStatus};

/// Upper bound for each component check
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

const HEALTH_CHECK_TEXT: &str = "helpline health check";

async fn within<T, E: Display>(check: impl Future<Output = Result<T, E>>) -> Result<T, String> {
  match tokio::time::timeout(CHECK_TIMEOUT, check).await {
    Ok(result) => result.map_err(|e| e.to_string()),
    Err(_) => Err(format!("no answer within {}s", CHECK_TIMEOUT.as_secs())),
  }
}

fn component(name: &str, result: Result<String, String>) -> ComponentHealth {
  let (healthy, message) = match result {
    Ok(message) => (true, message),
    Err(message) => (false, message),
  };
  ComponentHealth { name: name.to_string(), healthy, message }
}

/// An aborted last run is the only unhealthy sync state
fn sync_health(status: &SyncStatus) -> Result<String, String> {
  if let Some(report) = status.last_report.as_ref().filter(|r| r.outcome == Outcome::Aborted) {
    let reason = report.errors.last().map(String::as_str).unwrap_or("no error recorded");
    return Err(format!("last run {} aborted: {reason}", report.run_id));
  }
  Ok(match (&status.running, status.last_success) {
    (Some(run), _) => format!("run {} in progress", run.run_id),
    (None, Some(at)) => format!("idle, last success {}", at.to_rfc3339()),
    (None, None) => "idle, no successful run yet".to_string(),
  })
}

fn overall(components: &[ComponentHealth]) -> &'static str {
  if components.iter().all(|c| c.healthy) {
    "healthy"
  } else {
    "degraded"
  }
}

async fn check_components(state: &AppState) -> Vec<ComponentHealth> {
  let pipeline = state.orchestrator.pipeline();
  let check_text = [HEALTH_CHECK_TEXT.to_string()];

  let (index, embeddings, source) = tokio::join!(
    within(pipeline.stats()),
    within(pipeline.provider().embed(&check_text)),
    within(state.orchestrator.source().check_connection()),
  );

  let expected = pipeline.provider().dimension();
  let embeddings = embeddings.and_then(|vectors| match vectors.first() {
    Some(vector) if vector.len() == expected => Ok(format!("{expected} dimensions")),
    Some(vector) => Err(format!("returned {} dimensions, expected {expected}", vector.len())),
    None => Err("returned no vectors".to_string()),
  });

  vec![
    component("index", index.map(|stats| format!("{} documents", stats.documents))),
    component("embeddings", embeddings),
    component("source", source.map(|()| "reachable".to_string())),
    component("sync", state.orchestrator.status().map_err(|e| e.to_string()).and_then(|s| sync_health(&s))),
  ]
}

/// GET /status - Component health plus the wiring the server was started with
pub async fn status(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
) -> Json<BaseResponse<StatusResponse>> {
  let components = check_components(&state).await;
  for failed in components.iter().filter(|c| !c.healthy) {
    context.log_warn(&format!("{} unhealthy: {}", failed.name, failed.message), "status-api").await;
  }

  let pipeline = state.orchestrator.pipeline();
  let response = StatusResponse {
    status: overall(&components).to_string(),
    version: env!("CARGO_PKG_VERSION").to_string(),
    started_at: state.started_at,
    uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    source: state.source_name.clone(),
    provider: pipeline.provider().name(),
    index: pipeline.vector_index().name(),
    sync_running: state.orchestrator.is_running(),
    components,
  };

  Json(BaseResponse::success(response, context.request_id))
}

/// GET /version - Returns current API version
pub async fn version(
  Extension(context): Extension<RequestContext>,
) -> Json<BaseResponse<VersionResponse>> {
  let response = VersionResponse { version: env!("CARGO_PKG_VERSION").to_string() };
  Json(BaseResponse::success(response, context.request_id))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::{SyncReport, Trigger};
  use uuid::Uuid;

  fn idle() -> SyncStatus {
    SyncStatus {
      running: None,
      last_report: None,
      last_success: None,
      cursor: None,
      known_documents: 0,
      interval_secs: 900,
    }
  }

  #[test]
  fn test_aborted_run_makes_sync_unhealthy() {
    let mut report = SyncReport::new(Uuid::new_v4(), Trigger::Scheduled, None);
    report.outcome = Outcome::Aborted;
    report.errors.push("upstream returned 503".into());

    let status = SyncStatus { last_report: Some(report), ..idle() };
    let err = sync_health(&status).unwrap_err();

    assert!(err.contains("upstream returned 503"));
    assert!(sync_health(&idle()).is_ok());
  }

  #[test]
  fn test_any_failed_component_degrades_status() {
    let ok = component("index", Ok("3 documents".into()));
    let down = component("source", Err("connection refused".into()));

    assert_eq!(overall(std::slice::from_ref(&ok)), "healthy");
    assert_eq!(overall(&[ok, down]), "degraded");
  }

  #[tokio::test(start_paused = true)]
  async fn test_slow_checks_time_out() {
    let result = within(async {
      tokio::time::sleep(Duration::from_secs(60)).await;
      Ok::<_, String>(())
    })
    .await;

    assert!(result.unwrap_err().contains("no answer"));
  }
}
