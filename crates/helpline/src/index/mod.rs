//! Vector index adapters
//!
//! This module provides a generic interface for vector storage so the in-process index
//! and LanceDB can be swapped through configuration without touching the pipeline.

#[cfg(feature = "lancedb")]
pub mod lancedb;
pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, IndexBackend};
use crate::error::{ConfigError, IndexError};
use crate::models::{IndexHit, IndexedDocument, SearchFilters, StoredDocument};

pub use memory::MemoryIndex;

/// Vector storage with metadata and filtered cosine-similarity search
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
  fn name(&self) -> String;

  /// Insert or replace documents by id
  async fn upsert(&self, documents: &[IndexedDocument]) -> Result<(), IndexError>;

  /// Up to `top_k` nearest documents, highest score first
  async fn query(
    &self,
    vector: &[f32],
    top_k: usize,
    filters: &SearchFilters,
  ) -> Result<Vec<IndexHit>, IndexError>;

  /// Metadata of one document, None when the id is not indexed
  async fn get(&self, id: &str) -> Result<Option<StoredDocument>, IndexError>;

  async fn delete(&self, ids: &[String]) -> Result<(), IndexError>;

  async fn count(&self) -> Result<usize, IndexError>;
}

/// Cosine similarity; zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
  let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

  if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
    return 0.0;
  }
  dot / (norm_a * norm_b)
}

/// Build the configured index for vectors of `dimension`
pub async fn from_config(
  config: &Config,
  dimension: usize,
) -> Result<Arc<dyn VectorIndex>, ConfigError> {
  match config.index.backend {
    IndexBackend::Memory => {
      let snapshot = config.index_path().join("memory_index.json");
      let index = MemoryIndex::open(snapshot, dimension)
        .map_err(|e| ConfigError::Invalid(format!("failed to open memory index: {e}")))?;
      Ok(Arc::new(index))
    }
    IndexBackend::Lancedb => lancedb_index(config, dimension).await,
  }
}

#[cfg(feature = "lancedb")]
async fn lancedb_index(
  config: &Config,
  dimension: usize,
) -> Result<Arc<dyn VectorIndex>, ConfigError> {
  let index = lancedb::LanceDbIndex::open(config.index_path(), &config.index.table, dimension)
    .await
    .map_err(|e| ConfigError::Invalid(format!("failed to open LanceDB index: {e}")))?;
  Ok(Arc::new(index))
}

#[cfg(not(feature = "lancedb"))]
async fn lancedb_index(
  _config: &Config,
  _dimension: usize,
) -> Result<Arc<dyn VectorIndex>, ConfigError> {
  Err(ConfigError::Invalid(
    "index.backend is lancedb but helpline was built without the `lancedb` feature".to_string(),
  ))
}
