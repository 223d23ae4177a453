//! Error types for every external seam of the pipeline
//!
//! Each seam has its own `thiserror` enum. The [`Classify`] trait maps those onto the
//! four-way [`ErrorClass`] taxonomy that drives retry, skip and abort decisions.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// How a failure should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
  /// Network hiccup or 5xx; retry with exponential backoff
  Transient,
  /// Upstream asked us to slow down; retry after a longer delay
  RateLimited,
  /// The record itself is bad; skip it without blocking anything else
  DataIntegrity,
  /// Misconfiguration or incompatible schema; abort the run
  Fatal,
}

impl ErrorClass {
  pub fn is_retryable(self) -> bool {
    matches!(self, ErrorClass::Transient | ErrorClass::RateLimited)
  }
}

/// Classification hook consumed by [`crate::retry::RetryPolicy`]
pub trait Classify: std::fmt::Display {
  fn class(&self) -> ErrorClass;

  /// Delay requested by the upstream, if any
  fn retry_after(&self) -> Option<Duration> {
    None
  }

  /// Build the error reported when a single call exceeds its timeout
  fn timed_out(after: Duration) -> Self
  where
    Self: Sized;
}

// Source
// ======

#[derive(Debug, Clone, Error)]
pub enum SourceError {
  #[error("source unavailable: {0}")]
  Unavailable(String),

  #[error("source rate limited")]
  RateLimited { retry_after: Option<Duration> },

  #[error("source rejected request (HTTP {status}): {message}")]
  Rejected { status: u16, message: String },

  #[error("malformed source response: {0}")]
  Malformed(String),

  #[error("source call timed out after {0:?}")]
  Timeout(Duration),
}

impl Classify for SourceError {
  fn class(&self) -> ErrorClass {
    match self {
      SourceError::Unavailable(_) | SourceError::Malformed(_) | SourceError::Timeout(_) => {
        ErrorClass::Transient
      }
      SourceError::RateLimited { .. } => ErrorClass::RateLimited,
      SourceError::Rejected { .. } => ErrorClass::Fatal,
    }
  }

  fn retry_after(&self) -> Option<Duration> {
    match self {
      SourceError::RateLimited { retry_after } => *retry_after,
      _ => None,
    }
  }

  fn timed_out(after: Duration) -> Self {
    SourceError::Timeout(after)
  }
}

// Embedding provider
// ==================

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
  #[error("embedding provider unavailable: {0}")]
  Unavailable(String),

  #[error("embedding provider quota exceeded")]
  QuotaExceeded { retry_after: Option<Duration> },

  #[error("embedding provider rejected request (HTTP {status}): {message}")]
  Rejected { status: u16, message: String },

  #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("embedding provider returned {actual} vectors for {expected} inputs")]
  CountMismatch { expected: usize, actual: usize },

  #[error("embedding inference failed: {0}")]
  Inference(String),

  #[error("embedding call timed out after {0:?}")]
  Timeout(Duration),
}

impl Classify for ProviderError {
  fn class(&self) -> ErrorClass {
    match self {
      ProviderError::Unavailable(_)
      | ProviderError::CountMismatch { .. }
      | ProviderError::Inference(_)
      | ProviderError::Timeout(_) => ErrorClass::Transient,
      ProviderError::QuotaExceeded { .. } => ErrorClass::RateLimited,
      ProviderError::Rejected { .. } | ProviderError::DimensionMismatch { .. } => ErrorClass::Fatal,
    }
  }

  fn retry_after(&self) -> Option<Duration> {
    match self {
      ProviderError::QuotaExceeded { retry_after } => *retry_after,
      _ => None,
    }
  }

  fn timed_out(after: Duration) -> Self {
    ProviderError::Timeout(after)
  }
}

// Vector index
// ============

#[derive(Debug, Clone, Error)]
pub enum IndexError {
  #[error("vector index unavailable: {0}")]
  Unavailable(String),

  #[error("vector index schema mismatch: {0}")]
  SchemaMismatch(String),

  #[error("vector index call timed out after {0:?}")]
  Timeout(Duration),
}

impl Classify for IndexError {
  fn class(&self) -> ErrorClass {
    match self {
      IndexError::Unavailable(_) | IndexError::Timeout(_) => ErrorClass::Transient,
      IndexError::SchemaMismatch(_) => ErrorClass::Fatal,
    }
  }

  fn timed_out(after: Duration) -> Self {
    IndexError::Timeout(after)
  }
}

// Per-record outcome
// ==================

/// Why a single record did not make it into the index
#[derive(Debug, Clone, Error)]
pub enum RecordError {
  #[error("data integrity: {0}")]
  Integrity(String),

  #[error(transparent)]
  Provider(#[from] ProviderError),

  #[error(transparent)]
  Index(#[from] IndexError),
}

impl RecordError {
  pub fn class(&self) -> ErrorClass {
    match self {
      RecordError::Integrity(_) => ErrorClass::DataIntegrity,
      RecordError::Provider(e) => e.class(),
      RecordError::Index(e) => e.class(),
    }
  }

  pub fn is_fatal(&self) -> bool {
    self.class() == ErrorClass::Fatal
  }
}

// Persisted state and configuration
// =================================

#[derive(Debug, Error)]
pub enum StateError {
  #[error("failed to access sync state at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("sync state at {path} is corrupt: {source}")]
  Corrupt {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("invalid configuration: {0}")]
  Invalid(String),
}

// Top-level operations
// ====================

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("a sync run is already in progress")]
  AlreadyRunning,

  #[error("sync aborted: {0}")]
  Source(#[from] SourceError),

  #[error("sync aborted: {0}")]
  Provider(#[from] ProviderError),

  #[error("sync aborted: {0}")]
  Index(#[from] IndexError),

  #[error("sync aborted on invalid record: {0}")]
  Integrity(String),

  #[error(transparent)]
  State(#[from] StateError),
}

impl From<RecordError> for SyncError {
  fn from(error: RecordError) -> Self {
    match error {
      RecordError::Provider(e) => SyncError::Provider(e),
      RecordError::Index(e) => SyncError::Index(e),
      RecordError::Integrity(reason) => SyncError::Integrity(reason),
    }
  }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
  #[error("query text is empty")]
  EmptyQuery,

  #[error("invalid retrieval argument: {0}")]
  InvalidArgument(String),

  #[error(transparent)]
  Provider(#[from] ProviderError),

  #[error(transparent)]
  Index(#[from] IndexError),
}
