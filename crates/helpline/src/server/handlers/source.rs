//! Upstream source connection check

use axum::{
  extract::{Extension, State},
  response::Json,
};
use chrono::Utc;

use crate::server::middleware::RequestContext;
use crate::server::types::{BaseResponse, SourceCheckResponse};
use crate::server::AppState;

/// GET /source/check - Whether the configured source answers; failures are reported, not raised
pub async fn check(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
) -> Json<BaseResponse<SourceCheckResponse>> {
  let source = state.orchestrator.source();
  let error = match source.check_connection().await {
    Ok(()) => None,
    Err(e) => {
      context.log_warn(&format!("source {} unreachable: {e}", source.name()), "source-api").await;
      Some(e.to_string())
    }
  };

  let response = SourceCheckResponse {
    source: source.name(),
    connected: error.is_none(),
    error,
    checked_at: Utc::now(),
  };
  Json(BaseResponse::success(response, context.request_id))
}
