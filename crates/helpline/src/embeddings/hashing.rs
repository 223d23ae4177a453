//! Feature-hashing embeddings
//!
//! Terms are hashed into fixed buckets with FNV-1a and weighted by frequency, then the
//! vector is L2-normalized. No network and no model files, so it is always available;
//! similar wording still lands close together, which is enough for development and tests.

use async_trait::async_trait;
use std::collections::HashMap;

use super::{l2_normalize, EmbeddingProvider};
use crate::error::ProviderError;

pub struct HashingProvider {
  dimension: usize,
  batch_size: usize,
}

impl HashingProvider {
  pub fn new(dimension: usize, batch_size: usize) -> Self {
    Self { dimension: dimension.max(1), batch_size: batch_size.max(1) }
  }

  fn bucket(term: &str, dimension: usize) -> usize {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in term.as_bytes() {
      h ^= *b as u64;
      h = h.wrapping_mul(0x100000001b3);
    }
    (h % dimension as u64) as usize
  }

  fn tokenize(text: &str) -> Vec<String> {
    text
      .split(|c: char| !c.is_alphanumeric())
      .filter(|s| s.chars().count() >= 2)
      .map(str::to_lowercase)
      .collect()
  }

  /// Embed one text
  pub fn vectorize(&self, text: &str) -> Vec<f32> {
    let tokens = Self::tokenize(text);
    let mut vector = vec![0.0f32; self.dimension];
    if tokens.is_empty() {
      return vector;
    }

    let mut counts: HashMap<&str, f32> = HashMap::new();
    for token in &tokens {
      *counts.entry(token.as_str()).or_default() += 1.0;
    }

    let total = tokens.len() as f32;
    for (term, count) in counts {
      // Longer terms carry more meaning than short fillers
      let weight = 1.0 + (term.len() as f32).ln();
      vector[Self::bucket(term, self.dimension)] += count / total * weight;
    }

    l2_normalize(&mut vector);
    vector
  }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
  fn name(&self) -> String {
    "hashing".to_string()
  }

  fn dimension(&self) -> usize {
    self.dimension
  }

  fn max_batch_size(&self) -> usize {
    self.batch_size
  }

  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
    Ok(texts.iter().map(|text| self.vectorize(text)).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
  }

  #[test]
  fn test_empty_text_is_zero_vector() {
    let provider = HashingProvider::new(32, 8);
    assert!(provider.vectorize("").iter().all(|&x| x == 0.0));
  }

  #[test]
  fn test_output_is_unit_length() {
    let provider = HashingProvider::new(128, 8);
    let v = provider.vectorize("reset the domain password from the admin console");
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
  }

  #[test]
  fn test_related_texts_score_higher() {
    let provider = HashingProvider::new(256, 8);
    let query = provider.vectorize("vpn connection drops");
    let related = provider.vectorize("VPN connection keeps dropping after sleep");
    let unrelated = provider.vectorize("printer toner replacement steps");

    assert!(cosine(&query, &related) > cosine(&query, &unrelated));
  }

  #[tokio::test]
  async fn test_batch_matches_individual() {
    let provider = HashingProvider::new(64, 8);
    let texts = vec!["outlook profile".to_string(), "wifi roaming".to_string()];

    let batch = provider.embed(&texts).await.unwrap();

    assert_eq!(batch[0], provider.vectorize("outlook profile"));
    assert_eq!(batch[1], provider.vectorize("wifi roaming"));
  }
}
