//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

use helpline::cache::EmbeddingCache;
use helpline::config::SyncConfig;
use helpline::embeddings::{EmbeddingProvider, HashingProvider};
use helpline::error::{ProviderError, SourceError};
use helpline::index::{MemoryIndex, VectorIndex};
use helpline::indexing::IndexingPipeline;
use helpline::models::{Category, SolutionRecord};
use helpline::retry::RetryPolicy;
use helpline::source::sample::StaticSource;
use helpline::source::{SourceClient, SourcePage};
use helpline::sync::{StateStore, SyncOrchestrator, SyncState};

pub const DIMENSION: usize = 256;

pub fn day(n: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 4, n, 12, 0, 0).unwrap()
}

/// A record that passes default validation
pub fn record(id: &str, day_of_month: u32, topic: &str) -> SolutionRecord {
  let body = format!(
    "When users report {topic} problems, first confirm the affected device and account, \
     then restart the related service, review recent changes in ticket {id}, and escalate \
     to the infrastructure team if the fault persists after these checks."
  );
  SolutionRecord::new(id, format!("{topic} troubleshooting"), body, Category::General, day(day_of_month))
}

/// Hashing provider that counts calls, can poison texts and can hold its first call
pub struct TestProvider {
  inner: HashingProvider,
  pub calls: AtomicUsize,
  pub texts: AtomicUsize,
  poison: Mutex<Vec<String>>,
  fatal: AtomicBool,
  gate_armed: AtomicBool,
  pub entered: Notify,
  pub release: Notify,
}

impl TestProvider {
  pub fn new() -> Self {
    Self {
      inner: HashingProvider::new(DIMENSION, 32),
      calls: AtomicUsize::new(0),
      texts: AtomicUsize::new(0),
      poison: Mutex::new(Vec::new()),
      fatal: AtomicBool::new(false),
      gate_armed: AtomicBool::new(false),
      entered: Notify::new(),
      release: Notify::new(),
    }
  }

  /// Any text containing `marker` fails with a transient error
  pub fn poison(&self, marker: &str) {
    self.poison.lock().unwrap().push(marker.to_lowercase());
  }

  pub fn heal(&self) {
    self.poison.lock().unwrap().clear();
  }

  /// Every call fails with a non-retryable rejection
  pub fn set_fatal(&self, fatal: bool) {
    self.fatal.store(fatal, Ordering::SeqCst);
  }

  /// Make the next call wait for `release` after signalling `entered`
  pub fn hold_next_call(&self) {
    self.gate_armed.store(true, Ordering::SeqCst);
  }

  /// The vector `embed` would return for `text`
  pub fn vectorize(&self, text: &str) -> Vec<f32> {
    self.inner.vectorize(text)
  }

  pub fn texts_embedded(&self) -> usize {
    self.texts.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl EmbeddingProvider for TestProvider {
  fn name(&self) -> String {
    "test".to_string()
  }

  fn dimension(&self) -> usize {
    DIMENSION
  }

  fn max_batch_size(&self) -> usize {
    32
  }

  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
    if self.gate_armed.swap(false, Ordering::SeqCst) {
      self.entered.notify_one();
      self.release.notified().await;
    }

    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.fatal.load(Ordering::SeqCst) {
      return Err(ProviderError::Rejected { status: 401, message: "invalid api key".into() });
    }

    let poisoned = {
      let markers = self.poison.lock().unwrap();
      texts.iter().any(|text| {
        let text = text.to_lowercase();
        markers.iter().any(|marker| text.contains(marker))
      })
    };
    if poisoned {
      return Err(ProviderError::Unavailable("model crashed on input".into()));
    }

    self.texts.fetch_add(texts.len(), Ordering::SeqCst);
    self.inner.embed(texts).await
  }
}

/// Wraps a source and fails every page after the first while `failing` is set
pub struct FlakySource {
  pub inner: Arc<StaticSource>,
  pub failing: AtomicBool,
}

#[async_trait]
impl SourceClient for FlakySource {
  fn name(&self) -> String {
    "flaky".to_string()
  }

  async fn fetch_page(
    &self,
    modified_since: Option<DateTime<Utc>>,
    page_token: Option<String>,
  ) -> Result<SourcePage, SourceError> {
    if page_token.is_some() && self.failing.load(Ordering::SeqCst) {
      return Err(SourceError::Unavailable("upstream returned 503".into()));
    }
    self.inner.fetch_page(modified_since, page_token).await
  }
}

/// A source whose every request fails
pub struct DownSource;

#[async_trait]
impl SourceClient for DownSource {
  fn name(&self) -> String {
    "down".to_string()
  }

  async fn fetch_page(
    &self,
    _modified_since: Option<DateTime<Utc>>,
    _page_token: Option<String>,
  ) -> Result<SourcePage, SourceError> {
    Err(SourceError::Unavailable("connection refused".into()))
  }
}

/// Orchestrator over in-memory parts with zero-delay retries
pub struct Harness {
  pub dir: TempDir,
  pub provider: Arc<TestProvider>,
  pub index: Arc<MemoryIndex>,
  pub cache: Arc<EmbeddingCache>,
  pub pipeline: Arc<IndexingPipeline>,
  pub orchestrator: Arc<SyncOrchestrator>,
  pub store: StateStore,
}

impl Harness {
  pub fn new(source: Arc<dyn SourceClient>, batch_size: usize) -> Self {
    Self::with_concurrency(source, batch_size, 1)
  }

  pub fn with_concurrency(source: Arc<dyn SourceClient>, batch_size: usize, concurrency: usize) -> Self {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(TestProvider::new());
    let index = Arc::new(MemoryIndex::with_dimension(DIMENSION));
    let cache = Arc::new(EmbeddingCache::new(1_000, std::time::Duration::from_secs(3600)));

    let pipeline = Arc::new(IndexingPipeline::new(
      provider.clone(),
      index.clone(),
      cache.clone(),
      RetryPolicy::immediate(0),
    ));

    let config = SyncConfig {
      batch_size,
      concurrency,
      batch_retry: RetryPolicy::immediate(1),
      ..SyncConfig::default()
    };

    let store = StateStore::new(dir.path().join("sync_state.json"));
    let orchestrator = Arc::new(SyncOrchestrator::new(
      source,
      pipeline.clone(),
      store.clone(),
      config,
      RetryPolicy::immediate(0),
    ));

    Self { dir, provider, index, cache, pipeline, orchestrator, store }
  }

  pub fn state(&self) -> SyncState {
    self.store.load().unwrap()
  }

  pub async fn documents(&self) -> usize {
    self.index.count().await.unwrap()
  }
}
