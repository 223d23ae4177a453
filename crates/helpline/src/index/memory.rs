//! In-process vector index
//!
//! Brute-force cosine search over a map of documents, with an optional JSON snapshot
//! that is atomically rewritten after every mutation so the index survives restarts.
//! Snapshots are written on the blocking pool and a mutation only reaches the map once
//! its snapshot is on disk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::{cosine_similarity, VectorIndex};
use crate::error::IndexError;
use crate::models::{IndexHit, IndexedDocument, SearchFilters, StoredDocument};
use crate::persist::write_json_atomic;

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
  dimension: Option<usize>,
  documents: Vec<IndexedDocument>,
}

#[derive(Default)]
struct Inner {
  /// Fixed by the constructor or by the first upsert
  dimension: Option<usize>,
  documents: HashMap<String, IndexedDocument>,
}

pub struct MemoryIndex {
  inner: RwLock<Inner>,
  snapshot_path: Option<PathBuf>,
  /// Held across a whole mutation so snapshots land in the order the map changes
  writer: tokio::sync::Mutex<()>,
}

impl Default for MemoryIndex {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryIndex {
  /// Volatile index whose dimension is set by the first upsert
  pub fn new() -> Self {
    Self::from_inner(Inner::default(), None)
  }

  pub fn with_dimension(dimension: usize) -> Self {
    Self::from_inner(Inner { dimension: Some(dimension), documents: HashMap::new() }, None)
  }

  fn from_inner(inner: Inner, snapshot_path: Option<PathBuf>) -> Self {
    Self { inner: RwLock::new(inner), snapshot_path, writer: tokio::sync::Mutex::new(()) }
  }

  /// Load (or start) a snapshot-backed index.
  ///
  /// A snapshot written for another dimension is discarded; the sync orchestrator
  /// notices the empty index and rebuilds it.
  pub fn open(path: PathBuf, dimension: usize) -> std::io::Result<Self> {
    let snapshot = read_snapshot(&path)?;

    let documents = match snapshot.dimension {
      Some(stored) if stored != dimension => {
        herald::warn!(
          "memory index at {} holds {stored}-dimensional vectors, expected {dimension}; starting empty",
          path.display()
        );
        HashMap::new()
      }
      _ => snapshot.documents.into_iter().map(|doc| (doc.id.clone(), doc)).collect(),
    };

    Ok(Self::from_inner(Inner { dimension: Some(dimension), documents }, Some(path)))
  }

  fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, IndexError> {
    self.inner.read().map_err(|_| IndexError::Unavailable("memory index lock poisoned".into()))
  }

  fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, IndexError> {
    self.inner.write().map_err(|_| IndexError::Unavailable("memory index lock poisoned".into()))
  }

  /// Snapshot of the map as it will look after removing `removed` and adding `added`
  fn snapshot_after(
    &self,
    dimension: Option<usize>,
    removed: &[String],
    added: &[IndexedDocument],
  ) -> Result<Snapshot, IndexError> {
    let inner = self.read()?;
    let mut documents: Vec<IndexedDocument> = inner
      .documents
      .values()
      .filter(|doc| !removed.contains(&doc.id) && !added.iter().any(|new| new.id == doc.id))
      .cloned()
      .collect();
    documents.extend(added.iter().cloned());
    documents.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(Snapshot { dimension, documents })
  }

  /// Write `snapshot` on the blocking pool; no-op for a volatile index
  async fn persist(&self, snapshot: Snapshot) -> Result<(), IndexError> {
    let Some(path) = self.snapshot_path.clone() else {
      return Ok(());
    };

    tokio::task::spawn_blocking(move || write_json_atomic(&path, &snapshot))
      .await
      .map_err(|e| IndexError::Unavailable(format!("index snapshot task failed: {e}")))?
      .map_err(|e| IndexError::Unavailable(format!("failed to write index snapshot: {e}")))
  }
}

fn read_snapshot(path: &Path) -> std::io::Result<Snapshot> {
  if !path.exists() {
    return Ok(Snapshot::default());
  }
  let content = std::fs::read_to_string(path)?;
  serde_json::from_str(&content).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn check_dimension(expected: usize, actual: usize) -> Result<(), IndexError> {
  if expected == actual {
    Ok(())
  } else {
    Err(IndexError::SchemaMismatch(format!("expected {expected}-dimensional vectors, got {actual}")))
  }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
  fn name(&self) -> String {
    "memory".to_string()
  }

  async fn upsert(&self, documents: &[IndexedDocument]) -> Result<(), IndexError> {
    if documents.is_empty() {
      return Ok(());
    }

    let _writer = self.writer.lock().await;
    let dimension = self.read()?.dimension.unwrap_or(documents[0].vector.len());

    // Validate everything before touching the map so a bad batch changes nothing
    for doc in documents {
      check_dimension(dimension, doc.vector.len())?;
    }

    if self.snapshot_path.is_some() {
      let snapshot = self.snapshot_after(Some(dimension), &[], documents)?;
      self.persist(snapshot).await?;
    }

    let mut inner = self.write()?;
    inner.dimension = Some(dimension);
    for doc in documents {
      inner.documents.insert(doc.id.clone(), doc.clone());
    }
    Ok(())
  }

  async fn query(
    &self,
    vector: &[f32],
    top_k: usize,
    filters: &SearchFilters,
  ) -> Result<Vec<IndexHit>, IndexError> {
    let inner = self.read()?;
    if let Some(dimension) = inner.dimension {
      check_dimension(dimension, vector.len())?;
    }

    let mut hits: Vec<IndexHit> = inner
      .documents
      .values()
      .filter(|doc| filters.matches(&doc.metadata))
      .map(|doc| IndexHit {
        id: doc.id.clone(),
        score: cosine_similarity(vector, &doc.vector),
        metadata: doc.metadata.clone(),
        snippet: doc.snippet.clone(),
      })
      .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    hits.truncate(top_k);
    Ok(hits)
  }

  async fn get(&self, id: &str) -> Result<Option<StoredDocument>, IndexError> {
    Ok(self.read()?.documents.get(id).map(StoredDocument::from))
  }

  async fn delete(&self, ids: &[String]) -> Result<(), IndexError> {
    let _writer = self.writer.lock().await;
    let (dimension, present) = {
      let inner = self.read()?;
      (inner.dimension, ids.iter().any(|id| inner.documents.contains_key(id)))
    };
    if !present {
      return Ok(());
    }

    if self.snapshot_path.is_some() {
      let snapshot = self.snapshot_after(dimension, ids, &[])?;
      self.persist(snapshot).await?;
    }

    let mut inner = self.write()?;
    for id in ids {
      inner.documents.remove(id);
    }
    Ok(())
  }

  async fn count(&self) -> Result<usize, IndexError> {
    Ok(self.read()?.documents.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::{Category, DocumentMetadata};
  use chrono::{TimeZone, Utc};
  use tempfile::TempDir;

  fn doc(id: &str, vector: Vec<f32>, category: Category) -> IndexedDocument {
    IndexedDocument {
      id: id.to_string(),
      vector,
      metadata: DocumentMetadata {
        title: format!("title {id}"),
        category,
        last_modified: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        tags: Vec::new(),
        url: None,
        content_hash: format!("hash-{id}"),
      },
      snippet: String::new(),
    }
  }

  #[tokio::test]
  async fn test_upsert_is_idempotent() {
    let index = MemoryIndex::new();
    let a = doc("A1", vec![1.0, 0.0], Category::Network);

    index.upsert(&[a.clone()]).await.unwrap();
    index.upsert(&[a]).await.unwrap();

    assert_eq!(index.count().await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_query_orders_by_similarity_and_filters() {
    let index = MemoryIndex::new();
    index
      .upsert(&[
        doc("near", vec![1.0, 0.1], Category::Network),
        doc("far", vec![0.0, 1.0], Category::Network),
        doc("email", vec![1.0, 0.0], Category::Email),
      ])
      .await
      .unwrap();

    let all = index.query(&[1.0, 0.0], 10, &SearchFilters::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, "email");
    assert!(all[0].score >= all[1].score && all[1].score >= all[2].score);

    let network =
      index.query(&[1.0, 0.0], 1, &SearchFilters::category(Category::Network)).await.unwrap();
    assert_eq!(network.len(), 1);
    assert_eq!(network[0].id, "near");
  }

  #[tokio::test]
  async fn test_dimension_mismatch_is_schema_error() {
    let index = MemoryIndex::with_dimension(2);

    let err = index.upsert(&[doc("A1", vec![1.0, 0.0, 0.0], Category::General)]).await.unwrap_err();
    assert!(matches!(err, IndexError::SchemaMismatch(_)));

    let err = index.query(&[1.0], 3, &SearchFilters::default()).await.unwrap_err();
    assert!(matches!(err, IndexError::SchemaMismatch(_)));
  }

  #[tokio::test]
  async fn test_delete_removes_documents() {
    let index = MemoryIndex::new();
    index.upsert(&[doc("A1", vec![1.0], Category::General)]).await.unwrap();

    index.delete(&["A1".to_string(), "missing".to_string()]).await.unwrap();

    assert_eq!(index.count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_snapshot_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index").join("memory_index.json");

    let index = MemoryIndex::open(path.clone(), 2).unwrap();
    index.upsert(&[doc("A1", vec![0.6, 0.8], Category::Hardware)]).await.unwrap();
    drop(index);

    let reopened = MemoryIndex::open(path.clone(), 2).unwrap();
    assert_eq!(reopened.count().await.unwrap(), 1);

    let other_dimension = MemoryIndex::open(path, 3).unwrap();
    assert_eq!(other_dimension.count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_failed_snapshot_write_leaves_index_unchanged() {
    let dir = TempDir::new().unwrap();
    // A file where the snapshot directory should be makes every write fail
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let index = MemoryIndex::open(blocker.join("memory_index.json"), 2).unwrap();
    let err = index.upsert(&[doc("A1", vec![0.6, 0.8], Category::Hardware)]).await.unwrap_err();

    assert!(matches!(err, IndexError::Unavailable(_)));
    assert_eq!(index.count().await.unwrap(), 0);
    assert!(index.get("A1").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_delete_is_persisted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memory_index.json");

    let index = MemoryIndex::open(path.clone(), 1).unwrap();
    index
      .upsert(&[doc("A1", vec![1.0], Category::General), doc("A2", vec![1.0], Category::General)])
      .await
      .unwrap();
    index.delete(&["A1".to_string()]).await.unwrap();

    let reopened = MemoryIndex::open(path, 1).unwrap();
    assert_eq!(reopened.count().await.unwrap(), 1);
    assert!(reopened.get("A2").await.unwrap().is_some());
  }

  #[tokio::test]
  async fn test_get_returns_stored_metadata() {
    let index = MemoryIndex::new();
    index.upsert(&[doc("A1", vec![1.0, 0.0], Category::Network)]).await.unwrap();

    let stored = index.get("A1").await.unwrap().unwrap();
    assert_eq!(stored.id, "A1");
    assert_eq!(stored.metadata.category, Category::Network);
    assert_eq!(stored.dimension, 2);
    assert!(index.get("missing").await.unwrap().is_none());
  }
}
