//! Request context and middleware for the helpline REST API
//!
//! Every request gets a `RequestContext` carrying a request id (reused as the response
//! transaction id) and a handle on the run journal, so handlers can record operator
//! actions next to the sync runs they caused.

use axum::{
  extract::{Request, State},
  http::{HeaderValue, Method, Uri},
  middleware::Next,
  response::Response,
};
use herald::journal::{EntryLevel, Journal};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct RequestContext {
  pub request_id: Uuid,
  pub method: Method,
  pub uri: Uri,
  journal: Option<Journal>,
}

impl RequestContext {
  pub fn new(method: Method, uri: Uri, journal: Option<Journal>) -> Self {
    Self { request_id: Uuid::new_v4(), method, uri, journal }
  }

  pub async fn log_info(&self, message: &str, component: &str) {
    self.log(EntryLevel::Info, message, component).await;
  }

  pub async fn log_warn(&self, message: &str, component: &str) {
    self.log(EntryLevel::Warn, message, component).await;
  }

  pub async fn log_error(&self, message: &str, component: &str) {
    self.log(EntryLevel::Error, message, component).await;
  }

  /// Journal when one is configured, console otherwise
  async fn log(&self, level: EntryLevel, message: &str, component: &str) {
    let message = format!("[{}] {} {} - {message}", self.request_id, self.method, self.uri.path());
    match &self.journal {
      Some(journal) => journal.record(level, component, &message).await,
      None => herald::emit(level.console(), &format!("[{component}] {message}")),
    }
  }
}

/// Inject a `RequestContext`, tag the response with its id and trace the timing
pub async fn request_context_middleware(
  State(state): State<AppState>,
  mut request: Request,
  next: Next,
) -> Response {
  let context =
    RequestContext::new(request.method().clone(), request.uri().clone(), state.journal.clone());
  let request_id = context.request_id;
  let method = context.method.clone();
  let path = context.uri.path().to_string();

  let started = Instant::now();
  request.extensions_mut().insert(context);

  let span = tracing::info_span!("request", id = %request_id, method = %method, path = %path);
  let mut response = next.run(request).instrument(span).await;

  let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
  herald::verbose!("[{request_id}] {method} {path} -> {} ({duration_ms:.2}ms)", response.status().as_u16());

  if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
    response.headers_mut().insert(REQUEST_ID_HEADER, value);
  }
  response
}
