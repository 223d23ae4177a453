//! Server wiring and start-up

use anyhow::{Context, Result};
use axum::Router;
use herald::journal::Journal;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::routing::create_router;
use super::AppState;
use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::indexing::IndexingPipeline;
use crate::retrieval::RetrievalEngine;
use crate::sync::{StateStore, SyncOrchestrator};
use crate::{embeddings, index, source};

impl AppState {
  /// Build every component named by `config`.
  ///
  /// Runs started by the returned orchestrator stop between batches once `shutdown`
  /// fires.
  pub async fn build(config: &Config, shutdown: CancellationToken) -> Result<Self> {
    let provider = embeddings::from_config(&config.embedding).await?;
    let index = index::from_config(config, provider.dimension()).await?;
    let cache = Arc::new(EmbeddingCache::from_config(&config.cache));
    let source = source::from_config(config)?;

    herald::info!(
      "source: {}, provider: {} ({} dims), index: {}",
      source.name(),
      provider.name(),
      provider.dimension(),
      index.name()
    );

    let journal = Journal::open(config.journal_path())
      .with_context(|| format!("failed to open journal at {}", config.journal_path().display()))?;

    let pipeline = Arc::new(
      IndexingPipeline::new(provider.clone(), index.clone(), cache.clone(), config.retry.clone())
        .with_settings(&config.indexing),
    );

    let orchestrator = SyncOrchestrator::new(
      source.clone(),
      pipeline,
      StateStore::new(config.state_path()),
      config.sync.clone(),
      config.retry.clone(),
    )
    .with_journal(journal.clone())
    .with_shutdown(shutdown);

    let mut retrieval =
      RetrievalEngine::new(provider, index, config.retry.clone(), config.retrieval.clone());
    if config.cache.cache_queries && cache.is_enabled() {
      retrieval = retrieval.with_query_cache(cache);
    }

    Ok(Self::new(Arc::new(orchestrator), Arc::new(retrieval), source.name()).with_journal(journal))
  }
}

/// Router plus the HTTP tracing and CORS layers
pub fn build_app(state: AppState) -> Router {
  create_router(state)
    .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
}

/// Serve until `shutdown` fires
pub async fn start_server(state: AppState, addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
  let listener =
    TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
  herald::success!("helpline server listening on http://{}", listener.local_addr()?);

  axum::serve(listener, build_app(state))
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .context("server error")?;

  herald::info!("server stopped");
  Ok(())
}
