//! Arrow RecordBatch conversion for indexed documents

use arrow::array::{
  Array, ArrayRef, FixedSizeListBuilder, Float32Builder, Int64Array, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use crate::error::IndexError;
use crate::models::IndexedDocument;

pub const VECTOR_COLUMN: &str = "vector";

/// Arrow schema for a table of `dimension`-sized vectors
pub fn document_schema(dimension: usize) -> SchemaRef {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("title", DataType::Utf8, false),
    Field::new("category", DataType::Utf8, false),
    Field::new("last_modified", DataType::Int64, false),
    Field::new("tags", DataType::Utf8, false),
    Field::new("url", DataType::Utf8, true),
    Field::new("content_hash", DataType::Utf8, false),
    Field::new("snippet", DataType::Utf8, false),
    Field::new(
      VECTOR_COLUMN,
      DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension as i32),
      false,
    ),
  ]))
}

/// Vector width declared by an existing table schema
pub fn schema_dimension(schema: &Schema) -> Option<usize> {
  match schema.field_with_name(VECTOR_COLUMN).ok()?.data_type() {
    DataType::FixedSizeList(_, size) => Some(*size as usize),
    _ => None,
  }
}

/// Convert documents to a single RecordBatch
pub fn documents_to_batch(
  documents: &[IndexedDocument],
  dimension: usize,
) -> Result<RecordBatch, IndexError> {
  if let Some(bad) = documents.iter().find(|doc| doc.vector.len() != dimension) {
    return Err(IndexError::SchemaMismatch(format!(
      "document {} has {} dimensions, table expects {dimension}",
      bad.id,
      bad.vector.len()
    )));
  }

  let strings = |f: fn(&IndexedDocument) -> String| -> ArrayRef {
    Arc::new(StringArray::from(documents.iter().map(f).collect::<Vec<_>>()))
  };

  let urls: ArrayRef =
    Arc::new(StringArray::from(documents.iter().map(|d| d.metadata.url.clone()).collect::<Vec<_>>()));
  let timestamps: ArrayRef = Arc::new(Int64Array::from(
    documents.iter().map(|d| d.metadata.last_modified.timestamp_millis()).collect::<Vec<_>>(),
  ));

  let mut vectors =
    FixedSizeListBuilder::new(Float32Builder::with_capacity(dimension * documents.len()), dimension as i32);
  for doc in documents {
    vectors.values().append_slice(&doc.vector);
    vectors.append(true);
  }

  let columns: Vec<ArrayRef> = vec![
    strings(|d| d.id.clone()),
    strings(|d| d.metadata.title.clone()),
    strings(|d| d.metadata.category.as_str().to_string()),
    timestamps,
    strings(|d| serde_json::to_string(&d.metadata.tags).unwrap_or_else(|_| "[]".to_string())),
    urls,
    strings(|d| d.metadata.content_hash.clone()),
    strings(|d| d.snippet.clone()),
    Arc::new(vectors.finish()),
  ];

  RecordBatch::try_new(document_schema(dimension), columns)
    .map_err(|e| IndexError::SchemaMismatch(format!("failed to build record batch: {e}")))
}

/// Typed view over the string column `name`
pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, IndexError> {
  batch
    .column_by_name(name)
    .and_then(|col| col.as_any().downcast_ref::<StringArray>())
    .ok_or_else(|| IndexError::SchemaMismatch(format!("missing or mistyped '{name}' column")))
}

pub fn int64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, IndexError> {
  batch
    .column_by_name(name)
    .and_then(|col| col.as_any().downcast_ref::<Int64Array>())
    .ok_or_else(|| IndexError::SchemaMismatch(format!("missing or mistyped '{name}' column")))
}

/// Optional string value, treating nulls as absent
pub fn optional_string(array: &StringArray, row: usize) -> Option<String> {
  (!array.is_null(row)).then(|| array.value(row).to_string())
}
