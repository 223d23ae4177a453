//! # helpline
//!
//! Keeps a vector index of IT-support solutions in step with an upstream knowledge base
//! and answers similarity queries against it.
//!
//! - [`source`]: paged, incremental reads from the knowledge base
//! - [`embeddings`] and [`cache`]: text to vectors, memoized by content hash
//! - [`index`]: vector storage adapters
//! - [`indexing`]: validate, normalize, embed and upsert one batch of records
//! - [`sync`]: delta sync with a crash-safe watermark, plus the scheduler
//! - [`retrieval`]: query embedding, over-fetch, filtering and ranking
//! - [`server`] and [`cli`]: REST surface and its command-line client

pub mod cache;
pub mod cli;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod indexing;
pub mod models;
pub mod persist;
pub mod retrieval;
pub mod retry;
pub mod server;
pub mod source;
pub mod sync;
pub mod text;

pub use config::Config;
pub use error::{ErrorClass, RetrievalError, SyncError};
pub use indexing::IndexingPipeline;
pub use retrieval::{RetrievalEngine, RetrievalRequest};
pub use sync::{SyncOrchestrator, SyncReport};
