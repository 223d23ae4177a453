//! Indexed document lookup

use axum::{
  extract::{Extension, Path, State},
  http::StatusCode,
  response::Json,
};

use super::{failure, ApiResult};
use crate::server::middleware::RequestContext;
use crate::server::types::{BaseResponse, DocumentResponse};
use crate::server::AppState;

/// GET /documents/{id} - Stored metadata and snippet of one solution; 404 when not indexed
pub async fn get_document(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  Path(id): Path<String>,
) -> ApiResult<DocumentResponse> {
  let found = state.orchestrator.pipeline().get(&id).await.map_err(|e| {
    failure(StatusCode::SERVICE_UNAVAILABLE, "index_unavailable", &e.to_string(), context.request_id)
  })?;

  match found {
    Some(document) => Ok(Json(BaseResponse::success(DocumentResponse { document }, context.request_id))),
    None => Err(failure(
      StatusCode::NOT_FOUND,
      "document_not_found",
      &format!("no indexed solution with id {id}"),
      context.request_id,
    )),
  }
}
