//! Index statistics handler

use axum::{
  extract::{Extension, State},
  http::StatusCode,
  response::Json,
};

use super::{failure, ApiResult};
use crate::server::middleware::RequestContext;
use crate::server::types::{BaseResponse, IndexStatsResponse};
use crate::server::AppState;

/// GET /index/stats
pub async fn stats(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
) -> ApiResult<IndexStatsResponse> {
  let stats = state.orchestrator.pipeline().stats().await.map_err(|e| {
    failure(StatusCode::SERVICE_UNAVAILABLE, "index_unavailable", &e.to_string(), context.request_id)
  })?;
  Ok(Json(BaseResponse::success(IndexStatsResponse { stats }, context.request_id)))
}
