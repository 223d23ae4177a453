//! Retrieval engine: query text in, ranked context set out
//!
//! The query is embedded with the indexing provider, the index is over-fetched, and
//! the hits are filtered, deduplicated by document id and ranked. No language model is
//! involved here; the results are what an answer generator would cite.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{query_key, EmbeddingCache};
use crate::config::RetrievalConfig;
use crate::embeddings::{check_vectors, EmbeddingProvider};
use crate::error::RetrievalError;
use crate::index::VectorIndex;
use crate::models::{IndexHit, RetrievalResult, SearchFilters};
use crate::retry::RetryPolicy;

/// Retrieval parameters; unset values fall back to configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RetrievalRequest {
  pub query: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub top_k: Option<usize>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub min_score: Option<f32>,

  #[serde(default)]
  pub filters: SearchFilters,
}

impl RetrievalRequest {
  pub fn new(query: impl Into<String>) -> Self {
    Self { query: query.into(), ..Self::default() }
  }
}

pub struct RetrievalEngine {
  provider: Arc<dyn EmbeddingProvider>,
  index: Arc<dyn VectorIndex>,
  /// Query embedding cache; None disables query memoization
  cache: Option<Arc<EmbeddingCache>>,
  retry: RetryPolicy,
  config: RetrievalConfig,
}

impl RetrievalEngine {
  pub fn new(
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    retry: RetryPolicy,
    config: RetrievalConfig,
  ) -> Self {
    Self { provider, index, cache: None, retry, config }
  }

  pub fn with_query_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
    self.cache = Some(cache);
    self
  }

  pub fn config(&self) -> &RetrievalConfig {
    &self.config
  }

  /// Retrieve with configured defaults for anything the request leaves unset
  pub async fn handle(
    &self,
    request: &RetrievalRequest,
  ) -> Result<Vec<RetrievalResult>, RetrievalError> {
    self
      .retrieve(
        &request.query,
        request.top_k.unwrap_or(self.config.top_k),
        request.min_score.unwrap_or(self.config.min_score),
        &request.filters,
      )
      .await
  }

  /// Up to `top_k` documents scoring at least `min_score`, best first
  pub async fn retrieve(
    &self,
    query: &str,
    top_k: usize,
    min_score: f32,
    filters: &SearchFilters,
  ) -> Result<Vec<RetrievalResult>, RetrievalError> {
    let query = query.trim();
    if query.is_empty() {
      return Err(RetrievalError::EmptyQuery);
    }
    if !min_score.is_finite() {
      let message = format!("min_score must be finite, got {min_score}");
      return Err(RetrievalError::InvalidArgument(message));
    }
    if top_k == 0 {
      return Ok(Vec::new());
    }

    let vector = self.embed_query(query).await?;
    let fetch = top_k.saturating_mul(self.config.over_fetch.max(1));
    let hits = self.retry.run("query index", || self.index.query(&vector, fetch, filters)).await?;

    let candidates = hits.len();
    let ranked = rank(hits, top_k, min_score, filters);
    herald::debug!("retrieved {} of {candidates} candidates for query", ranked.len());
    Ok(ranked)
  }

  async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RetrievalError> {
    let key = query_key(query);
    if let Some(vector) = self.cache.as_ref().and_then(|cache| cache.get(&key)) {
      return Ok(vector);
    }

    let texts = [query.to_string()];
    let mut vectors = self.retry.run("embed query", || self.provider.embed(&texts)).await?;
    check_vectors(&vectors, 1, self.provider.dimension())?;

    let vector = vectors.pop().unwrap_or_default();
    if let Some(cache) = &self.cache {
      cache.put(key, vector.clone());
    }
    Ok(vector)
  }
}

/// Filter, deduplicate and order raw index hits
pub fn rank(
  hits: Vec<IndexHit>,
  top_k: usize,
  min_score: f32,
  filters: &SearchFilters,
) -> Vec<RetrievalResult> {
  let mut best: HashMap<String, IndexHit> = HashMap::new();

  for hit in hits {
    if !hit.score.is_finite() || hit.score < min_score || !filters.matches(&hit.metadata) {
      continue;
    }
    match best.get(&hit.id) {
      Some(existing) if existing.score >= hit.score => {}
      _ => {
        best.insert(hit.id.clone(), hit);
      }
    }
  }

  let mut ranked: Vec<IndexHit> = best.into_values().collect();
  ranked.sort_by(compare_hits);
  ranked.truncate(top_k);
  ranked.into_iter().map(RetrievalResult::from).collect()
}

/// Score desc, then newest first, then id for a total order
fn compare_hits(a: &IndexHit, b: &IndexHit) -> Ordering {
  b.score
    .total_cmp(&a.score)
    .then_with(|| b.metadata.last_modified.cmp(&a.metadata.last_modified))
    .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::embeddings::MockEmbeddingProvider;
  use crate::error::ProviderError;
  use crate::index::MockVectorIndex;
  use crate::models::{Category, DocumentMetadata};
  use chrono::{TimeZone, Utc};

  fn hit(id: &str, score: f32, day: u32, category: Category) -> IndexHit {
    IndexHit {
      id: id.into(),
      score,
      metadata: DocumentMetadata {
        title: id.into(),
        category,
        last_modified: Utc.with_ymd_and_hms(2024, 2, day, 0, 0, 0).unwrap(),
        tags: Vec::new(),
        url: None,
        content_hash: id.into(),
      },
      snippet: String::new(),
    }
  }

  fn ids(results: &[RetrievalResult]) -> Vec<&str> {
    results.iter().map(|r| r.document_id.as_str()).collect()
  }

  #[test]
  fn test_rank_dedupes_keeping_highest_score() {
    let hits = vec![
      hit("A", 0.82, 1, Category::General),
      hit("A", 0.91, 1, Category::General),
      hit("B", 0.70, 1, Category::General),
    ];

    let ranked = rank(hits, 4, 0.0, &SearchFilters::default());

    assert_eq!(ids(&ranked), vec!["A", "B"]);
    assert!((ranked[0].score - 0.91).abs() < 1e-6);
  }

  #[test]
  fn test_rank_breaks_ties_by_recency_then_id() {
    let hits = vec![
      hit("old", 0.5, 1, Category::General),
      hit("new", 0.5, 9, Category::General),
      hit("b-same", 0.5, 5, Category::General),
      hit("a-same", 0.5, 5, Category::General),
    ];

    let ranked = rank(hits, 10, 0.0, &SearchFilters::default());

    assert_eq!(ids(&ranked), vec!["new", "a-same", "b-same", "old"]);
  }

  #[test]
  fn test_rank_applies_min_score_filters_and_top_k() {
    let hits = vec![
      hit("net1", 0.9, 1, Category::Network),
      hit("mail", 0.95, 1, Category::Email),
      hit("net2", 0.8, 1, Category::Network),
      hit("net3", 0.2, 1, Category::Network),
    ];

    let ranked = rank(hits, 1, 0.3, &SearchFilters::category(Category::Network));

    assert_eq!(ids(&ranked), vec!["net1"]);
  }

  #[tokio::test]
  async fn test_empty_query_and_zero_top_k_skip_the_provider() {
    let mut provider = MockEmbeddingProvider::new();
    provider.expect_embed().never();
    let engine = RetrievalEngine::new(
      Arc::new(provider),
      Arc::new(MockVectorIndex::new()),
      RetryPolicy::immediate(0),
      RetrievalConfig::default(),
    );

    let err = engine.retrieve("   ", 4, 0.3, &SearchFilters::default()).await.unwrap_err();
    assert!(matches!(err, RetrievalError::EmptyQuery));

    let none = engine.retrieve("vpn", 0, 0.3, &SearchFilters::default()).await.unwrap();
    assert!(none.is_empty());

    let err = engine.retrieve("vpn", 4, f32::NAN, &SearchFilters::default()).await.unwrap_err();
    assert!(matches!(err, RetrievalError::InvalidArgument(_)));
  }

  #[tokio::test]
  async fn test_over_fetch_and_query_cache() {
    let mut provider = MockEmbeddingProvider::new();
    provider.expect_dimension().return_const(2usize);
    provider.expect_embed().times(1).returning(|_| Ok(vec![vec![1.0, 0.0]]));

    let mut index = MockVectorIndex::new();
    index
      .expect_query()
      .withf(|_, top_k, _| *top_k == 6)
      .times(2)
      .returning(|_, _, _| Ok(vec![hit("A", 0.9, 1, Category::Network)]));

    let cache = Arc::new(EmbeddingCache::new(10, std::time::Duration::from_secs(60)));
    let config = RetrievalConfig { top_k: 3, over_fetch: 2, ..RetrievalConfig::default() };
    let engine =
      RetrievalEngine::new(Arc::new(provider), Arc::new(index), RetryPolicy::immediate(0), config)
        .with_query_cache(cache);

    let request = RetrievalRequest::new("vpn drops");
    assert_eq!(ids(&engine.handle(&request).await.unwrap()), vec!["A"]);
    assert_eq!(ids(&engine.handle(&request).await.unwrap()), vec!["A"]);
  }

  #[tokio::test]
  async fn test_provider_errors_surface() {
    let mut provider = MockEmbeddingProvider::new();
    provider
      .expect_embed()
      .returning(|_| Err(ProviderError::Rejected { status: 401, message: "bad key".into() }));

    let engine = RetrievalEngine::new(
      Arc::new(provider),
      Arc::new(MockVectorIndex::new()),
      RetryPolicy::immediate(2),
      RetrievalConfig::default(),
    );

    let err = engine.retrieve("vpn", 4, 0.3, &SearchFilters::default()).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Provider(ProviderError::Rejected { .. })));
  }
}
