//! Domain records flowing through the pipeline

pub mod document;
pub mod record;

pub use document::{
  DocumentMetadata, IndexHit, IndexedDocument, RetrievalResult, SearchFilters, StoredDocument,
};
pub use record::{Category, SolutionRecord};
