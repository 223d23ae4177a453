//! HTTP client for the helpline REST API

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;

use crate::retrieval::RetrievalRequest;
use crate::server::types::{
  ApiError, BaseResponse, CancelResponse, DocumentResponse, IndexStatsResponse, LogsResponse,
  ResetResponse, RetrieveResponse, SourceCheckResponse, StatusResponse, SyncStartedResponse,
  SyncStatusResponse,
};

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:7878";

#[derive(Debug, Clone)]
pub struct ClientConfig {
  /// Base URL of the helpline server (e.g., "http://127.0.0.1:7878")
  pub base_url: String,
  pub timeout_secs: u64,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self { base_url: DEFAULT_SERVER.to_string(), timeout_secs: 30 }
  }
}

/// Only the error half of an envelope
#[derive(Deserialize)]
struct ErrorBody {
  #[serde(default)]
  errors: Vec<ApiError>,
}

pub struct HelplineClient {
  client: Client,
  config: ClientConfig,
}

impl HelplineClient {
  pub fn new(base_url: &str) -> Result<Self> {
    Self::with_config(ClientConfig { base_url: base_url.to_string(), ..ClientConfig::default() })
  }

  pub fn with_config(mut config: ClientConfig) -> Result<Self> {
    config.base_url = config.base_url.trim_end_matches('/').to_string();
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .context("failed to create HTTP client")?;
    Ok(Self { client, config })
  }

  pub fn base_url(&self) -> &str {
    &self.config.base_url
  }

  fn url(&self, path: &str) -> String {
    format!("{}{path}", self.config.base_url)
  }

  async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, action: &str) -> Result<T> {
    let response = timeout(Duration::from_secs(self.config.timeout_secs), request.send())
      .await
      .map_err(|_| anyhow!("{action}: request timed out"))?
      .with_context(|| format!("{action}: is helpline_server running at {}?", self.base_url()))?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
      return Err(anyhow!("{action} failed ({status}): {}", error_message(&body)));
    }

    let parsed: BaseResponse<T> = serde_json::from_str(&body)
      .with_context(|| format!("{action}: unexpected response body"))?;
    Ok(parsed.data)
  }

  pub async fn status(&self) -> Result<StatusResponse> {
    self.send(self.client.get(self.url("/status")), "status").await
  }

  pub async fn trigger_sync(&self) -> Result<SyncStartedResponse> {
    self.send(self.client.post(self.url("/sync")), "sync").await
  }

  pub async fn sync_status(&self) -> Result<SyncStatusResponse> {
    self.send(self.client.get(self.url("/sync/status")), "sync status").await
  }

  pub async fn cancel_sync(&self) -> Result<CancelResponse> {
    self.send(self.client.post(self.url("/sync/cancel")), "cancel").await
  }

  pub async fn reset_sync(&self) -> Result<ResetResponse> {
    self.send(self.client.post(self.url("/sync/reset")), "reset").await
  }

  pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrieveResponse> {
    self.send(self.client.post(self.url("/retrieve")).json(request), "query").await
  }

  pub async fn index_stats(&self) -> Result<IndexStatsResponse> {
    self.send(self.client.get(self.url("/index/stats")), "stats").await
  }

  pub async fn document(&self, id: &str) -> Result<DocumentResponse> {
    let url = self.url(&format!("/documents/{}", encode_segment(id)));
    self.send(self.client.get(url), "show").await
  }

  pub async fn check_source(&self) -> Result<SourceCheckResponse> {
    self.send(self.client.get(self.url("/source/check")), "source check").await
  }

  pub async fn logs(&self, limit: usize, level: Option<&str>) -> Result<LogsResponse> {
    let mut query = vec![("limit", limit.to_string())];
    if let Some(level) = level {
      query.push(("level", level.to_string()));
    }
    self.send(self.client.get(self.url("/logs")).query(&query), "logs").await
  }
}

/// Percent-encode everything but unreserved characters for use as one path segment
fn encode_segment(raw: &str) -> String {
  raw
    .bytes()
    .map(|b| match b {
      b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
      _ => format!("%{b:02X}"),
    })
    .collect()
}

/// First API error message in `body`, or the raw body
fn error_message(body: &str) -> String {
  serde_json::from_str::<ErrorBody>(body)
    .ok()
    .and_then(|parsed| parsed.errors.into_iter().next())
    .map(|error| error.message)
    .unwrap_or_else(|| body.trim().to_string())
}
