//! Configuration management for helpline
//!
//! Settings come from a YAML file (explicit path, `HELPLINE_CONFIG`, or
//! `~/.helpline/config.yaml`), then environment overrides for secrets and the most
//! commonly tuned knobs. Every field has a default so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::text::Validation;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
  /// Root for state, journal and on-disk index; defaults to `~/.helpline`
  #[serde(default)]
  pub data_dir: Option<PathBuf>,
  #[serde(default)]
  pub source: SourceConfig,
  #[serde(default)]
  pub embedding: EmbeddingConfig,
  #[serde(default)]
  pub index: IndexConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub indexing: IndexingConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  /// Policy for every source, provider and index call
  #[serde(default)]
  pub retry: RetryPolicy,
  #[serde(default)]
  pub retrieval: RetrievalConfig,
  #[serde(default)]
  pub server: ServerConfig,
}

// Sections
// ========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
  /// REST knowledge-base API
  Http,
  /// Built-in fixture solutions for development
  Sample,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
  #[serde(default = "default_source_kind")]
  pub kind: SourceKind,
  #[serde(default)]
  pub base_url: Option<String>,
  #[serde(default)]
  pub api_key: Option<String>,
  #[serde(default = "default_solutions_path")]
  pub solutions_path: String,
  #[serde(default = "default_page_size")]
  pub page_size: usize,
  /// Pause between page requests, keeps us under upstream rate limits
  #[serde(default = "default_page_delay_ms")]
  pub page_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
  /// Any OpenAI-compatible `/embeddings` endpoint
  Openai,
  /// Deterministic feature hashing, no network
  Hashing,
  /// Local ONNX sentence-transformer (requires the `onnx` feature)
  Onnx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
  #[serde(default = "default_provider")]
  pub provider: ProviderKind,
  /// Provider-specific model name; each provider has its own default
  #[serde(default)]
  pub model: Option<String>,
  #[serde(default)]
  pub api_key: Option<String>,
  #[serde(default = "default_embedding_base_url")]
  pub base_url: String,
  #[serde(default = "default_dimension")]
  pub dimension: usize,
  /// Largest number of texts per provider call
  #[serde(default = "default_embedding_batch_size")]
  pub batch_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
  Memory,
  /// On-disk LanceDB table (requires the `lancedb` feature)
  Lancedb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
  #[serde(default = "default_index_backend")]
  pub backend: IndexBackend,
  /// Defaults to `<data_dir>/index`
  #[serde(default)]
  pub path: Option<PathBuf>,
  #[serde(default = "default_table")]
  pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default = "default_cache_entries")]
  pub max_entries: u64,
  #[serde(default = "default_cache_ttl_secs")]
  pub ttl_secs: u64,
  /// Also memoize query embeddings in the retrieval engine
  #[serde(default = "default_true")]
  pub cache_queries: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
  #[serde(default)]
  pub validation: Validation,
  #[serde(default = "default_snippet_chars")]
  pub snippet_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
  #[serde(default = "default_interval_secs")]
  pub interval_secs: u64,
  /// Dirty records per indexing batch
  #[serde(default = "default_batch_size")]
  pub batch_size: usize,
  /// Batches indexed at the same time within a page
  #[serde(default = "default_concurrency")]
  pub concurrency: usize,
  /// Backoff for re-submitting a failed batch
  #[serde(default = "default_batch_retry")]
  pub batch_retry: RetryPolicy,
  /// Sync at start-up when the last success is missing or stale
  #[serde(default = "default_true")]
  pub run_on_start: bool,
  #[serde(default = "default_stale_after_secs")]
  pub stale_after_secs: u64,
  /// Defaults to `<data_dir>/sync_state.json`
  #[serde(default)]
  pub state_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
  #[serde(default = "default_top_k")]
  pub top_k: usize,
  #[serde(default = "default_min_score")]
  pub min_score: f32,
  /// Nearest neighbours requested per result slot
  #[serde(default = "default_over_fetch")]
  pub over_fetch: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_bind")]
  pub bind: SocketAddr,
}

// Default functions
// =================

fn default_true() -> bool {
  true
}
fn default_source_kind() -> SourceKind {
  SourceKind::Sample
}
fn default_solutions_path() -> String {
  "/solutions".to_string()
}
fn default_page_size() -> usize {
  100
}
fn default_page_delay_ms() -> u64 {
  100
}
fn default_provider() -> ProviderKind {
  ProviderKind::Hashing
}
fn default_embedding_base_url() -> String {
  "https://api.openai.com/v1".to_string()
}
fn default_dimension() -> usize {
  384
}
fn default_embedding_batch_size() -> usize {
  64
}
fn default_index_backend() -> IndexBackend {
  IndexBackend::Memory
}
fn default_table() -> String {
  "solutions".to_string()
}
fn default_cache_entries() -> u64 {
  10_000
}
fn default_cache_ttl_secs() -> u64 {
  7 * 24 * 60 * 60
}
fn default_snippet_chars() -> usize {
  300
}
fn default_interval_secs() -> u64 {
  300
}
fn default_batch_size() -> usize {
  50
}
fn default_concurrency() -> usize {
  2
}
fn default_batch_retry() -> RetryPolicy {
  RetryPolicy { max_retries: 2, initial_delay_ms: 2_000, call_timeout_secs: 0, ..RetryPolicy::default() }
}
fn default_stale_after_secs() -> u64 {
  60 * 60
}
fn default_top_k() -> usize {
  4
}
fn default_min_score() -> f32 {
  0.3
}
fn default_over_fetch() -> usize {
  2
}
fn default_bind() -> SocketAddr {
  SocketAddr::from(([127, 0, 0, 1], 7878))
}

impl Default for SourceConfig {
  fn default() -> Self {
    Self {
      kind: default_source_kind(),
      base_url: None,
      api_key: None,
      solutions_path: default_solutions_path(),
      page_size: default_page_size(),
      page_delay_ms: default_page_delay_ms(),
    }
  }
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      provider: default_provider(),
      model: None,
      api_key: None,
      base_url: default_embedding_base_url(),
      dimension: default_dimension(),
      batch_size: default_embedding_batch_size(),
    }
  }
}

impl Default for IndexConfig {
  fn default() -> Self {
    Self { backend: default_index_backend(), path: None, table: default_table() }
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      max_entries: default_cache_entries(),
      ttl_secs: default_cache_ttl_secs(),
      cache_queries: true,
    }
  }
}

impl Default for IndexingConfig {
  fn default() -> Self {
    Self { validation: Validation::default(), snippet_chars: default_snippet_chars() }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: default_interval_secs(),
      batch_size: default_batch_size(),
      concurrency: default_concurrency(),
      batch_retry: default_batch_retry(),
      run_on_start: true,
      stale_after_secs: default_stale_after_secs(),
      state_path: None,
    }
  }
}

impl Default for RetrievalConfig {
  fn default() -> Self {
    Self {
      top_k: default_top_k(),
      min_score: default_min_score(),
      over_fetch: default_over_fetch(),
    }
  }
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self { bind: default_bind() }
  }
}

// Loading
// =======

fn env_var(name: &str) -> Option<String> {
  std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
  /// Load configuration from a file
  pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
      .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

    if content.trim().is_empty() {
      return Ok(Config::default());
    }

    serde_yaml::from_str(&content)
      .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
  }

  /// Resolve, load, apply environment overrides and validate
  pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
    let candidate = explicit
      .map(Path::to_path_buf)
      .or_else(|| env_var("HELPLINE_CONFIG").map(PathBuf::from))
      .or_else(|| dirs::home_dir().map(|home| home.join(".helpline").join("config.yaml")));

    let mut config = match candidate {
      // An explicitly named file must exist
      Some(path) if explicit.is_some() || path.exists() => Self::load_from_file(&path)?,
      _ => Config::default(),
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
  }

  /// Environment overrides for secrets and common knobs
  pub fn apply_env(&mut self) {
    if let Some(dir) = env_var("HELPLINE_DATA_DIR") {
      self.data_dir = Some(PathBuf::from(dir));
    }
    if let Some(url) = env_var("HELPLINE_SOURCE_URL") {
      self.source.base_url = Some(url);
      self.source.kind = SourceKind::Http;
    }
    if let Some(key) = env_var("HELPLINE_SOURCE_API_KEY") {
      self.source.api_key = Some(key);
    }
    if let Some(key) = env_var("HELPLINE_EMBEDDING_API_KEY").or_else(|| env_var("OPENAI_API_KEY")) {
      self.embedding.api_key.get_or_insert(key);
    }
    if let Some(secs) = env_var("HELPLINE_SYNC_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
      self.sync.interval_secs = secs;
    }
  }

  /// Reject settings that cannot work, before anything touches the network
  pub fn validate(&self) -> Result<(), ConfigError> {
    let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

    if self.source.kind == SourceKind::Http && self.source.base_url.is_none() {
      return invalid("source.kind is http but source.base_url is not set");
    }
    if self.source.page_size == 0 {
      return invalid("source.page_size must be at least 1");
    }
    if self.embedding.provider == ProviderKind::Openai && self.embedding.api_key.is_none() {
      return invalid("embedding.provider is openai but no API key is configured");
    }
    if self.embedding.dimension == 0 {
      return invalid("embedding.dimension must be at least 1");
    }
    if self.embedding.batch_size == 0 {
      return invalid("embedding.batch_size must be at least 1");
    }
    if self.sync.batch_size == 0 {
      return invalid("sync.batch_size must be at least 1");
    }
    if self.sync.concurrency == 0 {
      return invalid("sync.concurrency must be at least 1");
    }
    if self.sync.interval_secs == 0 {
      return invalid("sync.interval_secs must be at least 1");
    }
    if !(-1.0..=1.0).contains(&self.retrieval.min_score) {
      return invalid("retrieval.min_score must be within [-1, 1]");
    }
    if self.retrieval.over_fetch == 0 {
      return invalid("retrieval.over_fetch must be at least 1");
    }
    if self.cache.enabled && self.cache.max_entries == 0 {
      return invalid("cache.max_entries must be at least 1 when the cache is enabled");
    }
    Ok(())
  }

  pub fn data_dir(&self) -> PathBuf {
    self.data_dir.clone().unwrap_or_else(default_data_dir)
  }

  pub fn state_path(&self) -> PathBuf {
    self.sync.state_path.clone().unwrap_or_else(|| self.data_dir().join("sync_state.json"))
  }

  pub fn journal_path(&self) -> PathBuf {
    self.data_dir().join("journal.jsonl")
  }

  pub fn index_path(&self) -> PathBuf {
    self.index.path.clone().unwrap_or_else(|| self.data_dir().join("index"))
  }
}

fn default_data_dir() -> PathBuf {
  dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".helpline")
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use tempfile::TempDir;

  fn clear_env() {
    for name in [
      "HELPLINE_CONFIG",
      "HELPLINE_DATA_DIR",
      "HELPLINE_SOURCE_URL",
      "HELPLINE_SOURCE_API_KEY",
      "HELPLINE_EMBEDDING_API_KEY",
      "OPENAI_API_KEY",
      "HELPLINE_SYNC_INTERVAL_SECS",
    ] {
      std::env::remove_var(name);
    }
  }

  #[test]
  fn test_defaults_are_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.sync.batch_size, 50);
    assert_eq!(config.retrieval.top_k, 4);
    assert_eq!(config.retrieval.over_fetch, 2);
  }

  #[test]
  fn test_partial_yaml_fills_defaults() {
    let config: Config = serde_yaml::from_str(
      "sync:\n  batch_size: 10\nretrieval:\n  min_score: 0.5\nembedding:\n  provider: hashing\n",
    )
    .unwrap();

    assert_eq!(config.sync.batch_size, 10);
    assert_eq!(config.sync.interval_secs, 300);
    assert_eq!(config.retrieval.min_score, 0.5);
    assert_eq!(config.retry.max_retries, 3);
  }

  #[test]
  fn test_validation_rejects_inconsistent_settings() {
    let mut config = Config::default();
    config.source.kind = SourceKind::Http;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

    let mut config = Config::default();
    config.embedding.provider = ProviderKind::Openai;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.retrieval.min_score = 1.5;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.sync.batch_size = 0;
    assert!(config.validate().is_err());
  }

  #[test]
  #[serial]
  fn test_load_explicit_file_with_env_overrides() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "source:\n  page_size: 25\n").unwrap();

    std::env::set_var("HELPLINE_SOURCE_URL", "https://kb.example/api");
    std::env::set_var("HELPLINE_DATA_DIR", dir.path());

    let config = Config::load(Some(&path)).unwrap();
    clear_env();

    assert_eq!(config.source.kind, SourceKind::Http);
    assert_eq!(config.source.page_size, 25);
    assert_eq!(config.state_path(), dir.path().join("sync_state.json"));
  }

  #[test]
  #[serial]
  fn test_missing_explicit_file_is_an_error() {
    clear_env();
    let result = Config::load(Some(Path::new("/definitely/not/here.yaml")));
    assert!(matches!(result, Err(ConfigError::Read { .. })));
  }
}
