//! Vector search and result processing for LanceDB

use ::lancedb::query::{ExecutableQuery, QueryBase};
use ::lancedb::{DistanceType, Table};
use arrow::array::{Array, Float32Array};
use arrow::record_batch::RecordBatch;
use chrono::{TimeZone, Utc};
use futures::stream::StreamExt;

use super::records::{int64_column, optional_string, schema_dimension, string_column, VECTOR_COLUMN};
use crate::error::IndexError;
use crate::models::{Category, DocumentMetadata, IndexHit, SearchFilters, StoredDocument};

/// Cosine search over `table`, pushing metadata filters down as a SQL predicate
pub async fn search(
  table: &Table,
  vector: &[f32],
  top_k: usize,
  filters: &SearchFilters,
) -> Result<Vec<IndexHit>, IndexError> {
  let mut query = table
    .vector_search(vector)
    .map_err(unavailable)?
    .column(VECTOR_COLUMN)
    .distance_type(DistanceType::Cosine)
    .limit(top_k);

  if let Some(predicate) = filter_predicate(filters) {
    query = query.only_if(predicate);
  }

  let mut stream = query.execute().await.map_err(unavailable)?;
  let mut hits = Vec::new();
  while let Some(batch) = stream.next().await {
    let batch = batch.map_err(unavailable)?;
    hits.extend(process_result_batch(&batch)?);
  }

  hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
  hits.truncate(top_k);
  Ok(hits)
}

pub(super) fn unavailable(e: ::lancedb::Error) -> IndexError {
  IndexError::Unavailable(e.to_string())
}

/// SQL `WHERE` clause for the filters, or None when nothing is filtered
pub fn filter_predicate(filters: &SearchFilters) -> Option<String> {
  let mut clauses = Vec::new();
  if let Some(category) = filters.category {
    clauses.push(format!("category = '{}'", category.as_str()));
  }
  if let Some(after) = filters.modified_after {
    clauses.push(format!("last_modified >= {}", after.timestamp_millis()));
  }
  if let Some(before) = filters.modified_before {
    clauses.push(format!("last_modified <= {}", before.timestamp_millis()));
  }

  (!clauses.is_empty()).then(|| clauses.join(" AND "))
}

/// Cosine distance is in [0, 2]; similarity is its complement
fn distance_to_similarity(distance: f32) -> f32 {
  1.0 - distance
}

fn process_result_batch(batch: &RecordBatch) -> Result<Vec<IndexHit>, IndexError> {
  let distances =
    batch.column_by_name("_distance").and_then(|col| col.as_any().downcast_ref::<Float32Array>());

  let mut hits = Vec::with_capacity(batch.num_rows());
  for (row, document) in stored_documents(batch)?.into_iter().enumerate() {
    let distance = match distances {
      Some(array) if !array.is_null(row) => array.value(row),
      _ => {
        herald::debug!("row {} has no distance, skipping", document.id);
        continue;
      }
    };

    hits.push(IndexHit {
      id: document.id,
      score: distance_to_similarity(distance),
      metadata: document.metadata,
      snippet: document.snippet,
    });
  }

  Ok(hits)
}

/// Decode every row of `batch` except the vector itself
fn stored_documents(batch: &RecordBatch) -> Result<Vec<StoredDocument>, IndexError> {
  let ids = string_column(batch, "id")?;
  let titles = string_column(batch, "title")?;
  let categories = string_column(batch, "category")?;
  let modified = int64_column(batch, "last_modified")?;
  let tags = string_column(batch, "tags")?;
  let urls = string_column(batch, "url")?;
  let hashes = string_column(batch, "content_hash")?;
  let snippets = string_column(batch, "snippet")?;
  let dimension = schema_dimension(&batch.schema()).unwrap_or(0);

  let mut documents = Vec::with_capacity(batch.num_rows());
  for row in 0..batch.num_rows() {
    let last_modified = Utc
      .timestamp_millis_opt(modified.value(row))
      .single()
      .ok_or_else(|| IndexError::SchemaMismatch(format!("bad timestamp for {}", ids.value(row))))?;

    documents.push(StoredDocument {
      id: ids.value(row).to_string(),
      metadata: DocumentMetadata {
        title: titles.value(row).to_string(),
        category: Category::parse_lenient(categories.value(row)),
        last_modified,
        tags: serde_json::from_str(tags.value(row)).unwrap_or_default(),
        url: optional_string(urls, row),
        content_hash: hashes.value(row).to_string(),
      },
      snippet: snippets.value(row).to_string(),
      dimension,
    });
  }

  Ok(documents)
}

/// First row matching `predicate`, without a vector search
pub async fn lookup(table: &Table, predicate: String) -> Result<Option<StoredDocument>, IndexError> {
  let mut stream = table.query().only_if(predicate).limit(1).execute().await.map_err(unavailable)?;

  while let Some(batch) = stream.next().await {
    let batch = batch.map_err(unavailable)?;
    if let Some(document) = stored_documents(&batch)?.into_iter().next() {
      return Ok(Some(document));
    }
  }
  Ok(None)
}
