//! Manual sync control: trigger, status, cancel and reset

use axum::{
  extract::{Extension, State},
  http::StatusCode,
  response::Json,
};

use super::{failure, ApiFailure, ApiResult};
use crate::error::SyncError;
use crate::server::middleware::RequestContext;
use crate::server::types::{
  BaseResponse, CancelResponse, ResetResponse, SyncStartedResponse, SyncStatusResponse,
};
use crate::server::AppState;
use crate::sync::Trigger;

fn sync_failure(context: &RequestContext, error: &SyncError) -> ApiFailure {
  let (status, key) = match error {
    SyncError::AlreadyRunning => (StatusCode::CONFLICT, "sync_already_running"),
    SyncError::State(_) => (StatusCode::INTERNAL_SERVER_ERROR, "sync_state_unavailable"),
    _ => (StatusCode::INTERNAL_SERVER_ERROR, "sync_failed"),
  };
  failure(status, key, &error.to_string(), context.request_id)
}

/// POST /sync - Start a run in the background; 409 while another is active
pub async fn trigger(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
) -> Result<(StatusCode, Json<BaseResponse<SyncStartedResponse>>), ApiFailure> {
  match state.orchestrator.trigger(Trigger::Manual) {
    Ok(run_id) => {
      context.log_info(&format!("manual sync {run_id} started"), "sync-api").await;
      let response = SyncStartedResponse { run_id };
      Ok((StatusCode::ACCEPTED, Json(BaseResponse::success(response, context.request_id))))
    }
    Err(e) => {
      context.log_warn(&format!("manual sync rejected: {e}"), "sync-api").await;
      Err(sync_failure(&context, &e))
    }
  }
}

/// GET /sync/status
pub async fn status(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
) -> ApiResult<SyncStatusResponse> {
  let sync = state.orchestrator.status().map_err(|e| sync_failure(&context, &e))?;
  Ok(Json(BaseResponse::success(SyncStatusResponse { sync }, context.request_id)))
}

/// POST /sync/cancel - Stop the active run after its in-flight batches
pub async fn cancel(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
) -> Json<BaseResponse<CancelResponse>> {
  let cancelled = state.orchestrator.cancel();
  if cancelled {
    context.log_info("cancellation requested", "sync-api").await;
  }
  Json(BaseResponse::success(CancelResponse { cancelled }, context.request_id))
}

/// POST /sync/reset - Drop the cursor and known hashes; 409 while a run is active
pub async fn reset(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
) -> ApiResult<ResetResponse> {
  if let Err(e) = state.orchestrator.reset().await {
    context.log_error(&format!("sync reset failed: {e}"), "sync-api").await;
    return Err(sync_failure(&context, &e));
  }
  Ok(Json(BaseResponse::success(ResetResponse { reset: true }, context.request_id)))
}
