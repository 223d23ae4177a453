//! Embedding providers
//!
//! Every provider maps a batch of texts to fixed-length vectors through the same
//! [`EmbeddingProvider`] trait. The concrete provider is chosen once at start-up by
//! [`from_config`]; nothing downstream inspects which one it got.

pub mod hashing;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod openai;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{EmbeddingConfig, ProviderKind};
use crate::error::{ConfigError, ProviderError};

pub use hashing::HashingProvider;
pub use openai::OpenAiProvider;

/// Text to vector mapping with a fixed dimensionality
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
  /// Identifier reported on status endpoints
  fn name(&self) -> String;

  fn dimension(&self) -> usize;

  /// Largest number of texts accepted by one `embed` call
  fn max_batch_size(&self) -> usize;

  /// One vector per input text, in input order
  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Check count and dimensionality of a provider response
pub fn check_vectors(
  vectors: &[Vec<f32>],
  expected_count: usize,
  dimension: usize,
) -> Result<(), ProviderError> {
  if vectors.len() != expected_count {
    return Err(ProviderError::CountMismatch { expected: expected_count, actual: vectors.len() });
  }
  if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
    return Err(ProviderError::DimensionMismatch { expected: dimension, actual: bad.len() });
  }
  Ok(())
}

/// Scale a vector to unit length in place; zero vectors are left alone
pub fn l2_normalize(vector: &mut [f32]) {
  let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm > f32::EPSILON {
    for value in vector.iter_mut() {
      *value /= norm;
    }
  }
}

/// Build the configured provider
pub async fn from_config(
  config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
  match config.provider {
    ProviderKind::Hashing => Ok(Arc::new(HashingProvider::new(config.dimension, config.batch_size))),
    ProviderKind::Openai => Ok(Arc::new(OpenAiProvider::from_config(config)?)),
    ProviderKind::Onnx => onnx_provider(config).await,
  }
}

#[cfg(feature = "onnx")]
async fn onnx_provider(
  config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
  let provider = onnx::OnnxProvider::load(config)
    .await
    .map_err(|e| ConfigError::Invalid(format!("failed to load ONNX model: {e}")))?;
  Ok(Arc::new(provider))
}

#[cfg(not(feature = "onnx"))]
async fn onnx_provider(
  _config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
  Err(ConfigError::Invalid(
    "embedding.provider is onnx but helpline was built without the `onnx` feature".to_string(),
  ))
}
