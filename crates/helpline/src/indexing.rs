//! Indexing pipeline: records in, embedded documents out
//!
//! Each record is normalized, validated and hashed, then its vector comes from the
//! embedding cache or the provider (in provider-sized sub-batches), and the finished
//! documents are bulk-upserted into the index. Failures are reported per record; only
//! fatal errors (rejected credentials, incompatible dimensions) end the whole call.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{CacheStats, EmbeddingCache};
use crate::config::IndexingConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::{Classify, ErrorClass, IndexError, ProviderError, RecordError};
use crate::index::VectorIndex;
use crate::models::{IndexedDocument, SolutionRecord, StoredDocument};
use crate::retry::RetryPolicy;
use crate::text::{self, Validation};

/// What happened to one record of a batch
#[derive(Debug, Clone)]
pub enum RecordOutcome {
  Indexed { id: String, content_hash: String, cache_hit: bool },
  Failed { id: String, error: RecordError },
}

impl RecordOutcome {
  pub fn id(&self) -> &str {
    match self {
      RecordOutcome::Indexed { id, .. } | RecordOutcome::Failed { id, .. } => id,
    }
  }

  pub fn is_indexed(&self) -> bool {
    matches!(self, RecordOutcome::Indexed { .. })
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexStats {
  pub documents: usize,
  pub index: String,
  pub provider: String,
  pub dimension: usize,
  pub cache: CacheStats,
}

/// A record that passed validation and is waiting for its vector
struct Prepared<'a> {
  slot: usize,
  record: &'a SolutionRecord,
  body: String,
  content_hash: String,
  text: String,
}

pub struct IndexingPipeline {
  provider: Arc<dyn EmbeddingProvider>,
  index: Arc<dyn VectorIndex>,
  cache: Arc<EmbeddingCache>,
  retry: RetryPolicy,
  validation: Validation,
  snippet_chars: usize,
}

impl IndexingPipeline {
  pub fn new(
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    cache: Arc<EmbeddingCache>,
    retry: RetryPolicy,
  ) -> Self {
    let defaults = IndexingConfig::default();
    Self {
      provider,
      index,
      cache,
      retry,
      validation: defaults.validation,
      snippet_chars: defaults.snippet_chars,
    }
  }

  pub fn with_settings(mut self, config: &IndexingConfig) -> Self {
    self.validation = config.validation.clone();
    self.snippet_chars = config.snippet_chars;
    self
  }

  pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
    &self.provider
  }

  pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
    &self.index
  }

  pub fn cache(&self) -> &Arc<EmbeddingCache> {
    &self.cache
  }

  /// Index a batch, returning one outcome per input record in input order.
  ///
  /// `Err` carries a fatal error; records handled before it may already be indexed.
  pub async fn index(&self, batch: &[SolutionRecord]) -> Result<Vec<RecordOutcome>, RecordError> {
    let mut outcomes: Vec<Option<RecordOutcome>> = vec![None; batch.len()];
    let mut prepared = Vec::with_capacity(batch.len());

    for (slot, record) in batch.iter().enumerate() {
      match self.prepare(slot, record) {
        Ok(item) => prepared.push(item),
        Err(error) => {
          herald::warn!("skipping solution {}: {error}", record.id);
          outcomes[slot] = Some(RecordOutcome::Failed { id: record.id.clone(), error });
        }
      }
    }

    let vectors = self.embed_all(&prepared, &mut outcomes).await?;

    let documents: Vec<(usize, IndexedDocument, bool)> = prepared
      .iter()
      .filter_map(|item| {
        let (vector, cache_hit) = vectors.get(&item.slot)?.clone();
        let document = IndexedDocument::from_record(
          item.record,
          &item.body,
          item.content_hash.clone(),
          vector,
          self.snippet_chars,
        );
        Some((item.slot, document, cache_hit))
      })
      .collect();

    let failed_upserts = self.upsert_all(&documents).await?;

    for (slot, document, cache_hit) in documents {
      outcomes[slot] = Some(match failed_upserts.get(&slot) {
        Some(error) => RecordOutcome::Failed { id: document.id, error: error.clone().into() },
        None => RecordOutcome::Indexed {
          id: document.id,
          content_hash: document.metadata.content_hash,
          cache_hit,
        },
      });
    }

    Ok(
      outcomes
        .into_iter()
        .zip(batch)
        .map(|(outcome, record)| {
          outcome.unwrap_or_else(|| RecordOutcome::Failed {
            id: record.id.clone(),
            error: RecordError::Integrity("record was not processed".into()),
          })
        })
        .collect(),
    )
  }

  fn prepare<'a>(
    &self,
    slot: usize,
    record: &'a SolutionRecord,
  ) -> Result<Prepared<'a>, RecordError> {
    if record.id.trim().is_empty() {
      return Err(RecordError::Integrity("record has an empty id".into()));
    }

    let body = text::normalize(&record.body);
    self.validation.check(&body).map_err(RecordError::Integrity)?;

    let content_hash = record.content_hash();
    if let Some(declared) = record.hash_conflict(&content_hash) {
      return Err(RecordError::Integrity(format!(
        "declared content hash {declared} does not match computed {content_hash}"
      )));
    }

    Ok(Prepared { slot, record, text: record.embedding_text(), body, content_hash })
  }

  /// Vectors by slot, with whether each came from the cache
  async fn embed_all(
    &self,
    prepared: &[Prepared<'_>],
    outcomes: &mut [Option<RecordOutcome>],
  ) -> Result<HashMap<usize, (Vec<f32>, bool)>, RecordError> {
    let mut vectors = HashMap::with_capacity(prepared.len());
    let mut misses = Vec::new();
    // Records sharing a content hash with an earlier miss, keyed to that miss's slot
    let mut first_slot: HashMap<&str, usize> = HashMap::new();
    let mut repeats = Vec::new();

    for item in prepared {
      if let Some(vector) = self.cache.get(&item.content_hash) {
        vectors.insert(item.slot, (vector, true));
        continue;
      }
      match first_slot.get(item.content_hash.as_str()) {
        Some(&slot) => repeats.push((item, slot)),
        None => {
          first_slot.insert(&item.content_hash, item.slot);
          misses.push(item);
        }
      }
    }

    for chunk in misses.chunks(self.provider.max_batch_size().max(1)) {
      let texts: Vec<String> = chunk.iter().map(|item| item.text.clone()).collect();

      match self.embed_texts(&texts).await {
        Ok(embedded) => {
          for (item, vector) in chunk.iter().zip(embedded) {
            self.cache.put(item.content_hash.clone(), vector.clone());
            vectors.insert(item.slot, (vector, false));
          }
        }
        Err(e) if is_fatal(&e) => return Err(e.into()),
        Err(e) if chunk.len() == 1 => {
          outcomes[chunk[0].slot] =
            Some(RecordOutcome::Failed { id: chunk[0].record.id.clone(), error: e.into() });
        }
        Err(e) => {
          herald::warn!("embedding {} texts failed ({e}); retrying one at a time", chunk.len());
          for item in chunk {
            match self.embed_texts(std::slice::from_ref(&item.text)).await {
              Ok(mut embedded) => {
                if let Some(vector) = embedded.pop() {
                  self.cache.put(item.content_hash.clone(), vector.clone());
                  vectors.insert(item.slot, (vector, false));
                }
              }
              Err(e) if is_fatal(&e) => return Err(e.into()),
              Err(e) => {
                outcomes[item.slot] =
                  Some(RecordOutcome::Failed { id: item.record.id.clone(), error: e.into() });
              }
            }
          }
        }
      }
    }

    for (item, slot) in repeats {
      if let Some((vector, _)) = vectors.get(&slot).cloned() {
        vectors.insert(item.slot, (vector, false));
      } else if let Some(RecordOutcome::Failed { error, .. }) = &outcomes[slot] {
        let error = error.clone();
        outcomes[item.slot] = Some(RecordOutcome::Failed { id: item.record.id.clone(), error });
      }
    }

    Ok(vectors)
  }

  async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
    let label = format!("embed {} texts with {}", texts.len(), self.provider.name());
    let vectors = self.retry.run(&label, || self.provider.embed(texts)).await?;
    crate::embeddings::check_vectors(&vectors, texts.len(), self.provider.dimension())?;
    Ok(vectors)
  }

  /// Bulk upsert, falling back to one document at a time; returns per-slot failures
  async fn upsert_all(
    &self,
    documents: &[(usize, IndexedDocument, bool)],
  ) -> Result<HashMap<usize, IndexError>, RecordError> {
    let mut failures = HashMap::new();
    if documents.is_empty() {
      return Ok(failures);
    }

    let docs: Vec<IndexedDocument> = documents.iter().map(|(_, doc, _)| doc.clone()).collect();
    let error = match self.upsert(&docs).await {
      Ok(()) => return Ok(failures),
      Err(e) if e.class() == ErrorClass::Fatal => return Err(e.into()),
      Err(e) => e,
    };

    if docs.len() == 1 {
      failures.insert(documents[0].0, error);
      return Ok(failures);
    }

    herald::warn!(
      "bulk upsert of {} documents failed ({error}); retrying one at a time",
      docs.len()
    );
    for (slot, doc, _) in documents {
      match self.upsert(std::slice::from_ref(doc)).await {
        Ok(()) => {}
        Err(e) if e.class() == ErrorClass::Fatal => return Err(e.into()),
        Err(e) => {
          failures.insert(*slot, e);
        }
      }
    }
    Ok(failures)
  }

  async fn upsert(&self, documents: &[IndexedDocument]) -> Result<(), IndexError> {
    let label = format!("upsert {} documents into {}", documents.len(), self.index.name());
    self.retry.run(&label, || self.index.upsert(documents)).await
  }

  /// Delete documents by id
  pub async fn remove(&self, ids: &[String]) -> Result<(), IndexError> {
    if ids.is_empty() {
      return Ok(());
    }
    let label = format!("delete {} documents from {}", ids.len(), self.index.name());
    self.retry.run(&label, || self.index.delete(ids)).await?;
    herald::info!("removed {} documents from the index", ids.len());
    Ok(())
  }

  /// Look up one indexed document by id
  pub async fn get(&self, id: &str) -> Result<Option<StoredDocument>, IndexError> {
    let label = format!("look up {id} in {}", self.index.name());
    self.retry.run(&label, || self.index.get(id)).await
  }

  pub async fn stats(&self) -> Result<IndexStats, IndexError> {
    let documents = self.retry.run("count documents", || self.index.count()).await?;
    Ok(IndexStats {
      documents,
      index: self.index.name(),
      provider: self.provider.name(),
      dimension: self.provider.dimension(),
      cache: self.cache.stats(),
    })
  }
}

fn is_fatal(error: &ProviderError) -> bool {
  error.class() == ErrorClass::Fatal
}
