//! REST API for operating a helpline service
//!
//! Manual sync control, status, retrieval and the run journal over HTTP. Every response
//! uses the `BaseResponse` envelope from [`types`].

pub mod handlers;
pub mod middleware;
pub mod routing;
pub mod startup;
pub mod types;

use chrono::{DateTime, Utc};
use herald::journal::Journal;
use std::sync::Arc;

use crate::retrieval::RetrievalEngine;
use crate::sync::SyncOrchestrator;

pub use routing::create_router;
pub use startup::{build_app, start_server};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
  pub orchestrator: Arc<SyncOrchestrator>,
  pub retrieval: Arc<RetrievalEngine>,
  pub journal: Option<Journal>,
  pub source_name: String,
  pub started_at: DateTime<Utc>,
}

impl AppState {
  pub fn new(
    orchestrator: Arc<SyncOrchestrator>,
    retrieval: Arc<RetrievalEngine>,
    source_name: String,
  ) -> Self {
    Self { orchestrator, retrieval, journal: None, source_name, started_at: Utc::now() }
  }

  pub fn with_journal(mut self, journal: Journal) -> Self {
    self.journal = Some(journal);
    self
  }
}
