mod common;

use async_trait::async_trait;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{Harness, TestProvider};
use helpline::config::RetrievalConfig;
use helpline::error::{IndexError, RetrievalError};
use helpline::index::{MemoryIndex, VectorIndex};
use helpline::models::{
  Category, IndexHit, IndexedDocument, RetrievalResult, SearchFilters, StoredDocument,
};
use helpline::retrieval::{RetrievalEngine, RetrievalRequest};
use helpline::retry::RetryPolicy;
use helpline::source::StaticSource;
use helpline::sync::Trigger;

async fn synced_sample() -> Harness {
  let harness = Harness::new(Arc::new(StaticSource::sample(4)), 3);
  harness.orchestrator.run(Trigger::Manual).await.unwrap();
  assert_eq!(harness.documents().await, 10);
  harness
}

fn engine(provider: Arc<TestProvider>, index: Arc<dyn VectorIndex>) -> RetrievalEngine {
  RetrievalEngine::new(provider, index, RetryPolicy::immediate(0), RetrievalConfig::default())
}

fn ids(results: &[RetrievalResult]) -> Vec<&str> {
  results.iter().map(|r| r.document_id.as_str()).collect()
}

/// Returns every hit twice, the copy scoring lower
struct DuplicatingIndex(Arc<MemoryIndex>);

#[async_trait]
impl VectorIndex for DuplicatingIndex {
  fn name(&self) -> String {
    "duplicating".to_string()
  }

  async fn upsert(&self, documents: &[IndexedDocument]) -> Result<(), IndexError> {
    self.0.upsert(documents).await
  }

  async fn query(
    &self,
    vector: &[f32],
    top_k: usize,
    filters: &SearchFilters,
  ) -> Result<Vec<IndexHit>, IndexError> {
    let hits = self.0.query(vector, top_k, filters).await?;
    let copies: Vec<IndexHit> =
      hits.iter().cloned().map(|hit| IndexHit { score: hit.score * 0.5, ..hit }).collect();
    Ok(copies.into_iter().chain(hits).collect())
  }

  async fn get(&self, id: &str) -> Result<Option<StoredDocument>, IndexError> {
    self.0.get(id).await
  }

  async fn delete(&self, ids: &[String]) -> Result<(), IndexError> {
    self.0.delete(ids).await
  }

  async fn count(&self) -> Result<usize, IndexError> {
    self.0.count().await
  }
}

#[tokio::test]
async fn test_results_are_ranked_and_relevant() {
  let harness = synced_sample().await;
  let engine = engine(harness.provider.clone(), harness.index.clone());

  let results = engine
    .retrieve("VPN connection problems", 3, -1.0, &SearchFilters::default())
    .await
    .unwrap();

  assert_eq!(results.len(), 3);
  assert!(results.windows(2).all(|pair| pair[0].score >= pair[1].score));
  assert!(results.iter().any(|r| r.metadata.title == "VPN Connection Problems"));
}

#[tokio::test]
async fn test_duplicate_hits_collapse_to_best_score() {
  let harness = synced_sample().await;
  let index = Arc::new(DuplicatingIndex(harness.index.clone()));
  let engine = engine(harness.provider.clone(), index);

  let results = engine
    .retrieve("printer offline", 5, -1.0, &SearchFilters::default())
    .await
    .unwrap();

  let mut unique = ids(&results);
  unique.sort();
  unique.dedup();
  assert_eq!(unique.len(), results.len());

  let query_vector = harness.provider.vectorize("printer offline");
  let best = harness.index.query(&query_vector, 1, &SearchFilters::default()).await.unwrap().remove(0);
  assert_eq!(results[0].document_id, best.id);
  assert!((results[0].score - best.score).abs() < 1e-6);
}

#[tokio::test]
async fn test_category_filter_and_min_score() {
  let harness = synced_sample().await;
  let engine = engine(harness.provider.clone(), harness.index.clone());

  let network = engine
    .retrieve("connection keeps dropping", 10, -1.0, &SearchFilters::category(Category::Network))
    .await
    .unwrap();
  assert_eq!(network.len(), 3);
  assert!(network.iter().all(|r| r.metadata.category == Category::Network));

  let strict =
    engine.retrieve("connection keeps dropping", 10, 0.99, &SearchFilters::default()).await.unwrap();
  assert!(strict.iter().all(|r| r.score >= 0.99));
}

#[tokio::test]
async fn test_query_cache_does_not_change_results() {
  let harness = synced_sample().await;
  let plain = engine(harness.provider.clone(), harness.index.clone());
  let cached =
    engine(harness.provider.clone(), harness.index.clone()).with_query_cache(harness.cache.clone());

  let request = RetrievalRequest {
    top_k: Some(5),
    min_score: Some(-1.0),
    ..RetrievalRequest::new("reset a user password")
  };

  let expected = plain.handle(&request).await.unwrap();
  let first = cached.handle(&request).await.unwrap();
  let calls = harness.provider.calls.load(Ordering::SeqCst);
  let second = cached.handle(&request).await.unwrap();

  assert_eq!(expected, first);
  assert_eq!(first, second);
  // The second cached lookup never reached the provider
  assert_eq!(harness.provider.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
  let harness = synced_sample().await;
  let engine = engine(harness.provider.clone(), harness.index.clone());

  let empty = engine.handle(&RetrievalRequest::new("   ")).await.unwrap_err();
  assert!(matches!(empty, RetrievalError::EmptyQuery));

  let nan = engine.retrieve("vpn", 3, f32::NAN, &SearchFilters::default()).await.unwrap_err();
  assert!(matches!(nan, RetrievalError::InvalidArgument(_)));

  let calls = harness.provider.calls.load(Ordering::SeqCst);
  assert!(engine.retrieve("vpn", 0, 0.0, &SearchFilters::default()).await.unwrap().is_empty());
  assert_eq!(harness.provider.calls.load(Ordering::SeqCst), calls);
}
