//! Logs endpoint handler

use axum::{
  extract::{Extension, Query, State},
  http::StatusCode,
  response::Json,
};
use herald::journal::EntryLevel;

use super::{failure, ApiResult};
use crate::server::middleware::RequestContext;
use crate::server::types::{BaseResponse, LogsQuery, LogsResponse};
use crate::server::AppState;

const DEFAULT_LIMIT: usize = 100;

/// GET /logs?limit=&level= - Newest journal entries first
pub async fn get_logs(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  Query(query): Query<LogsQuery>,
) -> ApiResult<LogsResponse> {
  let level = match query.level.as_deref() {
    Some(raw) => Some(raw.parse::<EntryLevel>().map_err(|e| {
      failure(StatusCode::BAD_REQUEST, "invalid_level", &e, context.request_id)
    })?),
    None => None,
  };

  let Some(journal) = &state.journal else {
    return Ok(Json(BaseResponse::success(LogsResponse { logs: Vec::new() }, context.request_id)));
  };

  let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
  match journal.recent(Some(limit), level).await {
    Ok(logs) => Ok(Json(BaseResponse::success(LogsResponse { logs }, context.request_id))),
    Err(e) => Err(failure(
      StatusCode::INTERNAL_SERVER_ERROR,
      "logs_read_failed",
      &format!("Failed to read logs: {e}"),
      context.request_id,
    )),
  }
}
