//! Source clients for the upstream knowledge base
//!
//! A source serves solution records as a paginated feed filtered by an inclusive
//! `modified_since` timestamp. [`Pages`] walks that feed lazily, one page at a time,
//! retrying each fetch through the shared [`RetryPolicy`].

pub mod http;
pub mod sample;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::{Config, SourceKind};
use crate::error::{ConfigError, SourceError};
use crate::models::SolutionRecord;
use crate::retry::RetryPolicy;

pub use http::HttpSource;
pub use sample::StaticSource;

/// A feed entry that could not be turned into a [`SolutionRecord`]
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
  pub id: Option<String>,
  pub reason: String,
}

/// One page of the feed
#[derive(Debug, Clone, Default)]
pub struct SourcePage {
  pub records: Vec<SolutionRecord>,
  pub rejected: Vec<RejectedRecord>,
  /// Opaque token for the following page; None on the last page
  pub next_page_token: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceClient: Send + Sync {
  fn name(&self) -> String;

  /// Fetch one page of records with `last_modified >= modified_since`
  async fn fetch_page(
    &self,
    modified_since: Option<DateTime<Utc>>,
    page_token: Option<String>,
  ) -> Result<SourcePage, SourceError>;

  /// Reachability check: asks for records modified from now on, which is normally
  /// an empty page
  async fn check_connection(&self) -> Result<(), SourceError> {
    self.fetch_page(Some(Utc::now()), None).await.map(|_| ())
  }
}

/// Lazy, finite walk over the feed for one `modified_since` value.
///
/// Restarting means building a new `Pages` with the same cursor.
pub struct Pages<'a> {
  source: &'a dyn SourceClient,
  retry: &'a RetryPolicy,
  modified_since: Option<DateTime<Utc>>,
  next_token: Option<String>,
  fetched: usize,
  exhausted: bool,
}

impl<'a> Pages<'a> {
  pub fn new(
    source: &'a dyn SourceClient,
    retry: &'a RetryPolicy,
    modified_since: Option<DateTime<Utc>>,
  ) -> Self {
    Self { source, retry, modified_since, next_token: None, fetched: 0, exhausted: false }
  }

  /// Pages fetched so far
  pub fn fetched(&self) -> usize {
    self.fetched
  }

  /// The next page, `None` once the feed is exhausted.
  ///
  /// An error ends the walk; later calls return `None`.
  pub async fn next(&mut self) -> Option<Result<SourcePage, SourceError>> {
    if self.exhausted {
      return None;
    }

    let source = self.source;
    let since = self.modified_since;
    let token = self.next_token.clone();
    let label = format!("fetch page {} from {}", self.fetched + 1, source.name());
    let result = self.retry.run(&label, || source.fetch_page(since, token.clone())).await;

    match result {
      Ok(page) => {
        self.fetched += 1;
        self.next_token = page.next_page_token.clone();
        self.exhausted = self.next_token.is_none();
        Some(Ok(page))
      }
      Err(e) => {
        self.exhausted = true;
        Some(Err(e))
      }
    }
  }
}

/// Build the configured source
pub fn from_config(config: &Config) -> Result<Arc<dyn SourceClient>, ConfigError> {
  match config.source.kind {
    SourceKind::Http => Ok(Arc::new(HttpSource::from_config(&config.source)?)),
    SourceKind::Sample => Ok(Arc::new(StaticSource::sample(config.source.page_size))),
  }
}
