//! Request handlers, one module per endpoint group

pub mod documents;
pub mod index;
pub mod logs;
pub mod retrieve;
pub mod source;
pub mod status;
pub mod sync;

use axum::{http::StatusCode, response::Json};
use uuid::Uuid;

use crate::server::types::{ApiError, BaseResponse};

/// Error half of every handler result
pub type ApiFailure = (StatusCode, Json<BaseResponse<()>>);

pub type ApiResult<T> = Result<Json<BaseResponse<T>>, ApiFailure>;

pub fn failure(status: StatusCode, key: &str, message: &str, transaction_id: Uuid) -> ApiFailure {
  let error = ApiError::new(key, message);
  (status, Json(BaseResponse::<()>::error(vec![error], transaction_id)))
}
