//! LanceDB-backed vector index
//!
//! Documents live in a single table keyed by `id`. Upserts go through a merge-insert so
//! re-indexing a solution replaces its row, and search uses cosine distance with the
//! metadata filters pushed down as SQL.

mod records;
mod search;

use ::lancedb::{connect, Connection, Table};
use arrow::record_batch::RecordBatchIterator;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::VectorIndex;
use crate::error::IndexError;
use crate::models::{IndexHit, IndexedDocument, SearchFilters, StoredDocument};
use records::{document_schema, documents_to_batch, schema_dimension};
use search::unavailable;

pub struct LanceDbIndex {
  table: Table,
  dimension: usize,
}

/// Create a LanceDB connection, creating the data directory if needed
async fn create_connection(data_dir: &Path) -> Result<Connection, IndexError> {
  std::fs::create_dir_all(data_dir).map_err(|e| {
    IndexError::Unavailable(format!("failed to create {}: {e}", data_dir.display()))
  })?;

  connect(&data_dir.to_string_lossy()).execute().await.map_err(unavailable)
}

impl LanceDbIndex {
  /// Open `table` under `data_dir`, creating it empty on first use.
  ///
  /// An existing table built for another vector width is a schema mismatch.
  pub async fn open(data_dir: PathBuf, table: &str, dimension: usize) -> Result<Self, IndexError> {
    let connection = create_connection(&data_dir).await?;
    let existing = connection.table_names().execute().await.map_err(unavailable)?;

    let table = if existing.iter().any(|name| name == table) {
      let opened = connection.open_table(table).execute().await.map_err(unavailable)?;
      let schema = opened.schema().await.map_err(unavailable)?;
      match schema_dimension(&schema) {
        Some(stored) if stored == dimension => opened,
        stored => {
          return Err(IndexError::SchemaMismatch(format!(
            "table '{table}' stores {stored:?}-dimensional vectors, provider produces {dimension}"
          )))
        }
      }
    } else {
      let created = connection
        .create_empty_table(table, document_schema(dimension))
        .execute()
        .await
        .map_err(unavailable)?;
      herald::info!("created LanceDB table '{table}' at {}", data_dir.display());
      created
    };

    Ok(Self { table, dimension })
  }
}

/// SQL string literal list for an `IN (...)` predicate
fn id_list(ids: &[String]) -> String {
  ids.iter().map(|id| format!("'{}'", id.replace('\'', "''"))).collect::<Vec<_>>().join(", ")
}

#[async_trait]
impl VectorIndex for LanceDbIndex {
  fn name(&self) -> String {
    "lancedb".to_string()
  }

  async fn upsert(&self, documents: &[IndexedDocument]) -> Result<(), IndexError> {
    if documents.is_empty() {
      return Ok(());
    }

    let batch = documents_to_batch(documents, self.dimension)?;
    let schema = batch.schema();
    let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

    let mut merge = self.table.merge_insert(&["id"]);
    merge.when_matched_update_all(None).when_not_matched_insert_all();
    merge.execute(Box::new(reader)).await.map_err(unavailable)?;

    herald::verbose!("upserted {} documents into LanceDB", documents.len());
    Ok(())
  }

  async fn query(
    &self,
    vector: &[f32],
    top_k: usize,
    filters: &SearchFilters,
  ) -> Result<Vec<IndexHit>, IndexError> {
    if vector.len() != self.dimension {
      return Err(IndexError::SchemaMismatch(format!(
        "query has {} dimensions, table expects {}",
        vector.len(),
        self.dimension
      )));
    }
    if top_k == 0 {
      return Ok(Vec::new());
    }
    search::search(&self.table, vector, top_k, filters).await
  }

  async fn get(&self, id: &str) -> Result<Option<StoredDocument>, IndexError> {
    search::lookup(&self.table, format!("id = {}", id_list(&[id.to_string()]))).await
  }

  async fn delete(&self, ids: &[String]) -> Result<(), IndexError> {
    if ids.is_empty() {
      return Ok(());
    }
    self.table.delete(&format!("id IN ({})", id_list(ids))).await.map_err(unavailable)?;
    Ok(())
  }

  async fn count(&self) -> Result<usize, IndexError> {
    self.table.count_rows(None).await.map_err(unavailable)
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
      id: id.into(),
      vector,
      metadata: DocumentMetadata {
        title: format!("title {id}"),
        category,
        last_modified: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        tags: vec!["kb".into()],
        url: None,
        content_hash: format!("hash-{id}"),
      },
      snippet: "snippet".into(),
    }
  }

  #[test]
  fn test_id_list_escapes_quotes() {
    assert_eq!(id_list(&["a".into(), "o'brien".into()]), "'a', 'o''brien'");
  }

  #[tokio::test]
  async fn test_upsert_query_delete() {
    let dir = TempDir::new().unwrap();
    let index = LanceDbIndex::open(dir.path().to_path_buf(), "solutions", 2).await.unwrap();

    index
      .upsert(&[doc("A", vec![1.0, 0.0], Category::Network), doc("B", vec![0.0, 1.0], Category::Email)])
      .await
      .unwrap();
    index.upsert(&[doc("A", vec![1.0, 0.0], Category::Network)]).await.unwrap();
    assert_eq!(index.count().await.unwrap(), 2);

    let hits = index.query(&[1.0, 0.0], 2, &SearchFilters::default()).await.unwrap();
    assert_eq!(hits[0].id, "A");
    assert!(hits[0].score > 0.99);

    let email = index.query(&[1.0, 0.0], 2, &SearchFilters::category(Category::Email)).await.unwrap();
    assert_eq!(email.len(), 1);
    assert_eq!(email[0].id, "B");

    let stored = index.get("B").await.unwrap().unwrap();
    assert_eq!(stored.metadata.category, Category::Email);
    assert_eq!(stored.dimension, 2);

    index.delete(&["A".into()]).await.unwrap();
    assert_eq!(index.count().await.unwrap(), 1);
    assert!(index.get("A").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_reopen_with_other_dimension_fails() {
    let dir = TempDir::new().unwrap();
    LanceDbIndex::open(dir.path().to_path_buf(), "solutions", 2).await.unwrap();

    let err = LanceDbIndex::open(dir.path().to_path_buf(), "solutions", 3).await.err().unwrap();
    assert!(matches!(err, IndexError::SchemaMismatch(_)));
  }
}
