//! Embedding cache keyed by content hash
//!
//! Pure memoization in front of the embedding provider. A miss always falls through to
//! live computation, so dropping or disabling the cache never changes results.

use moka::sync::Cache;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::CacheConfig;

/// Counters surfaced on the status endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CacheStats {
  pub enabled: bool,
  pub entries: u64,
  pub hits: u64,
  pub misses: u64,
}

pub struct EmbeddingCache {
  cache: Option<Cache<String, Vec<f32>>>,
  hits: AtomicU64,
  misses: AtomicU64,
}

impl EmbeddingCache {
  /// Size- and age-bounded cache
  pub fn new(max_entries: u64, ttl: Duration) -> Self {
    let cache = Cache::builder().max_capacity(max_entries).time_to_live(ttl).build();
    Self { cache: Some(cache), hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
  }

  /// A cache that never stores anything
  pub fn disabled() -> Self {
    Self { cache: None, hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
  }

  pub fn from_config(config: &CacheConfig) -> Self {
    if config.enabled {
      Self::new(config.max_entries, Duration::from_secs(config.ttl_secs))
    } else {
      Self::disabled()
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.cache.is_some()
  }

  pub fn get(&self, content_hash: &str) -> Option<Vec<f32>> {
    let found = self.cache.as_ref().and_then(|cache| cache.get(content_hash));
    let counter = if found.is_some() { &self.hits } else { &self.misses };
    counter.fetch_add(1, Ordering::Relaxed);
    found
  }

  /// First write wins; entries are never replaced
  pub fn put(&self, content_hash: String, vector: Vec<f32>) {
    if let Some(cache) = &self.cache {
      cache.entry(content_hash).or_insert(vector);
    }
  }

  pub fn len(&self) -> u64 {
    self.cache.as_ref().map_or(0, |cache| {
      cache.run_pending_tasks();
      cache.entry_count()
    })
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&self) {
    if let Some(cache) = &self.cache {
      cache.invalidate_all();
    }
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      enabled: self.is_enabled(),
      entries: self.len(),
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
    }
  }
}

/// Cache key for a query embedding; namespaced away from record hashes
pub fn query_key(query: &str) -> String {
  format!("q:{}", blake3::hash(query.trim().as_bytes()).to_hex())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn cache() -> EmbeddingCache {
    EmbeddingCache::new(100, Duration::from_secs(60))
  }

  #[test]
  fn test_put_then_get() {
    let cache = cache();
    cache.put("abc".to_string(), vec![1.0, 2.0]);

    assert_eq!(cache.get("abc"), Some(vec![1.0, 2.0]));
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn test_entries_are_never_replaced() {
    let cache = cache();
    cache.put("abc".to_string(), vec![1.0]);
    cache.put("abc".to_string(), vec![9.0]);

    assert_eq!(cache.get("abc"), Some(vec![1.0]));
  }

  #[test]
  fn test_hit_and_miss_counters() {
    let cache = cache();
    cache.put("a".to_string(), vec![1.0]);

    cache.get("a");
    cache.get("b");
    cache.get("b");

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
  }

  #[test]
  fn test_disabled_cache_always_misses() {
    let cache = EmbeddingCache::disabled();
    cache.put("a".to_string(), vec![1.0]);

    assert_eq!(cache.get("a"), None);
    assert!(cache.is_empty());
    assert!(!cache.stats().enabled);
  }

  #[test]
  fn test_clear_invalidates() {
    let cache = cache();
    cache.put("a".to_string(), vec![1.0]);
    cache.clear();
    assert_eq!(cache.get("a"), None);
  }

  #[test]
  fn test_query_keys_do_not_collide_with_hashes() {
    let key = query_key("  vpn keeps dropping ");
    assert!(key.starts_with("q:"));
    assert_eq!(key, query_key("vpn keeps dropping"));
    assert_ne!(key.trim_start_matches("q:"), crate::text::content_hash("vpn keeps dropping", ""));
  }
}
