//! Retrieval endpoint handler

use axum::{
  extract::{Extension, State},
  http::StatusCode,
  response::Json,
};

use super::{failure, ApiResult};
use crate::error::RetrievalError;
use crate::retrieval::RetrievalRequest;
use crate::server::middleware::RequestContext;
use crate::server::types::{BaseResponse, RetrieveResponse};
use crate::server::AppState;

fn status_for(error: &RetrievalError) -> (StatusCode, &'static str) {
  match error {
    RetrievalError::EmptyQuery => (StatusCode::BAD_REQUEST, "empty_query"),
    RetrievalError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
    RetrievalError::Provider(_) => (StatusCode::BAD_GATEWAY, "embedding_failed"),
    RetrievalError::Index(_) => (StatusCode::SERVICE_UNAVAILABLE, "index_unavailable"),
  }
}

/// POST /retrieve - Ranked context set for a query
pub async fn retrieve(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  Json(request): Json<RetrievalRequest>,
) -> ApiResult<RetrieveResponse> {
  match state.retrieval.handle(&request).await {
    Ok(results) => {
      let count = results.len();
      Ok(Json(BaseResponse::success(RetrieveResponse { results, count }, context.request_id)))
    }
    Err(e) => {
      let (status, key) = status_for(&e);
      if status.is_server_error() {
        context.log_error(&format!("retrieval failed: {e}"), "retrieve-api").await;
      }
      Err(failure(status, key, &e.to_string(), context.request_id))
    }
  }
}
