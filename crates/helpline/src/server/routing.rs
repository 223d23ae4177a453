//! Axum router configuration for all endpoints

use axum::{
  middleware,
  routing::{get, post},
  Router,
};

use super::handlers::{documents, index, logs, retrieve, source, status, sync};
use super::middleware::request_context_middleware;
use super::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
  Router::new()
    // Status and version endpoints
    .route("/status", get(status::status))
    .route("/version", get(status::version))
    // Sync control
    .route("/sync", post(sync::trigger))
    .route("/sync/status", get(sync::status))
    .route("/sync/cancel", post(sync::cancel))
    .route("/sync/reset", post(sync::reset))
    // Retrieval and index
    .route("/retrieve", post(retrieve::retrieve))
    .route("/index/stats", get(index::stats))
    .route("/documents/{id}", get(documents::get_document))
    .route("/source/check", get(source::check))
    .route("/logs", get(logs::get_logs))
    .layer(middleware::from_fn_with_state(state.clone(), request_context_middleware))
    .with_state(state)
}
