//! Indexed documents, search hits and retrieval results

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::record::{Category, SolutionRecord};
use crate::text;

/// Metadata stored alongside every vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DocumentMetadata {
  pub title: String,
  pub category: Category,
  pub last_modified: DateTime<Utc>,

  #[serde(default)]
  pub tags: Vec<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,

  pub content_hash: String,
}

/// What the indexing pipeline writes into the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
  pub id: String,
  pub vector: Vec<f32>,
  pub metadata: DocumentMetadata,
  pub snippet: String,
}

impl IndexedDocument {
  /// Build from a record whose body has already been normalized
  pub fn from_record(
    record: &SolutionRecord,
    normalized_body: &str,
    content_hash: String,
    vector: Vec<f32>,
    snippet_chars: usize,
  ) -> Self {
    Self {
      id: record.id.clone(),
      vector,
      metadata: DocumentMetadata {
        title: text::normalize(&record.title),
        category: record.category,
        last_modified: record.last_modified,
        tags: record.tags.clone(),
        url: record.url.clone(),
        content_hash,
      },
      snippet: text::snippet(normalized_body, snippet_chars),
    }
  }
}

/// An indexed document as looked up by id, without its vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StoredDocument {
  pub id: String,
  pub metadata: DocumentMetadata,
  pub snippet: String,
  /// Width of the stored vector
  pub dimension: usize,
}

impl From<&IndexedDocument> for StoredDocument {
  fn from(doc: &IndexedDocument) -> Self {
    Self {
      id: doc.id.clone(),
      metadata: doc.metadata.clone(),
      snippet: doc.snippet.clone(),
      dimension: doc.vector.len(),
    }
  }
}

/// A single nearest-neighbour match returned by an index adapter
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
  pub id: String,
  /// Cosine similarity, higher is closer
  pub score: f32,
  pub metadata: DocumentMetadata,
  pub snippet: String,
}

/// One entry of the ranked context set handed to answer generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RetrievalResult {
  pub document_id: String,
  pub score: f32,
  pub metadata: DocumentMetadata,
  pub snippet: String,
}

impl From<IndexHit> for RetrievalResult {
  fn from(hit: IndexHit) -> Self {
    Self { document_id: hit.id, score: hit.score, metadata: hit.metadata, snippet: hit.snippet }
  }
}

/// Metadata filters for retrieval; date bounds are inclusive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchFilters {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<Category>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub modified_after: Option<DateTime<Utc>>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub modified_before: Option<DateTime<Utc>>,
}

impl SearchFilters {
  pub fn category(category: Category) -> Self {
    Self { category: Some(category), ..Self::default() }
  }

  pub fn is_empty(&self) -> bool {
    self.category.is_none() && self.modified_after.is_none() && self.modified_before.is_none()
  }

  pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
    self.category.is_none_or(|c| metadata.category == c)
      && self.modified_after.is_none_or(|after| metadata.last_modified >= after)
      && self.modified_before.is_none_or(|before| metadata.last_modified <= before)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn metadata(category: Category, day: u32) -> DocumentMetadata {
    DocumentMetadata {
      title: "t".into(),
      category,
      last_modified: Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap(),
      tags: Vec::new(),
      url: None,
      content_hash: "h".into(),
    }
  }

  #[test]
  fn test_empty_filters_match_everything() {
    let filters = SearchFilters::default();
    assert!(filters.is_empty());
    assert!(filters.matches(&metadata(Category::Email, 3)));
  }

  #[test]
  fn test_category_and_date_range() {
    let filters = SearchFilters {
      category: Some(Category::Network),
      modified_after: Some(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()),
      modified_before: Some(Utc.with_ymd_and_hms(2024, 5, 4, 0, 0, 0).unwrap()),
    };

    assert!(filters.matches(&metadata(Category::Network, 2)));
    assert!(filters.matches(&metadata(Category::Network, 4)));
    assert!(!filters.matches(&metadata(Category::Network, 5)));
    assert!(!filters.matches(&metadata(Category::Email, 3)));
  }

  #[test]
  fn test_document_from_record_normalizes() {
    let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let record = SolutionRecord::new("N1", "<b>VPN</b> drops", "raw", Category::Network, ts)
      .with_url("https://kb.example/N1");

    let doc = IndexedDocument::from_record(&record, "Reconnect the tunnel", "h1".into(), vec![1.0], 9);

    assert_eq!(doc.metadata.title, "VPN drops");
    assert_eq!(doc.snippet, "Reconnect...");
    assert_eq!(doc.metadata.url.as_deref(), Some("https://kb.example/N1"));
  }
}
