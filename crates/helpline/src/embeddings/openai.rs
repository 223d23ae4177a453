//! OpenAI-compatible `/embeddings` client

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{check_vectors, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{ConfigError, ProviderError};
use crate::retry::retry_after_header;

const DEFAULT_MODEL: &str = "text-embedding-3-small";

pub struct OpenAiProvider {
  client: Client,
  endpoint: String,
  model: String,
  dimension: usize,
  batch_size: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: &'a [String],
  dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
  index: usize,
}

impl OpenAiProvider {
  pub fn from_config(config: &EmbeddingConfig) -> Result<Self, ConfigError> {
    let api_key = config
      .api_key
      .as_deref()
      .map(str::trim)
      .filter(|key| !key.is_empty())
      .ok_or_else(|| ConfigError::Invalid("missing embedding API key".to_string()))?;

    let mut headers = HeaderMap::new();
    let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
      .map_err(|_| ConfigError::Invalid("embedding API key is not a valid header".to_string()))?;
    headers.insert(AUTHORIZATION, auth);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let client = Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| ConfigError::Invalid(format!("failed to build embedding HTTP client: {e}")))?;

    Ok(Self {
      client,
      endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
      model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
      dimension: config.dimension,
      batch_size: config.batch_size.max(1),
    })
  }
}

/// Map a non-success HTTP status to the provider error taxonomy
fn status_error(status: StatusCode, headers: &HeaderMap, body: String) -> ProviderError {
  if status == StatusCode::TOO_MANY_REQUESTS {
    ProviderError::QuotaExceeded { retry_after: retry_after_header(headers) }
  } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
    ProviderError::Unavailable(format!("HTTP {status}: {body}"))
  } else {
    ProviderError::Rejected { status: status.as_u16(), message: body }
  }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
  fn name(&self) -> String {
    format!("openai:{}", self.model)
  }

  fn dimension(&self) -> usize {
    self.dimension
  }

  fn max_batch_size(&self) -> usize {
    self.batch_size
  }

  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    let request = EmbeddingRequest { model: &self.model, input: texts, dimensions: self.dimension };
    let response = self
      .client
      .post(&self.endpoint)
      .json(&request)
      .send()
      .await
      .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let headers = response.headers().clone();
      let body = response.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
      return Err(status_error(status, &headers, body));
    }

    let mut parsed: EmbeddingResponse = response
      .json()
      .await
      .map_err(|e| ProviderError::Unavailable(format!("invalid embedding response: {e}")))?;
    parsed.data.sort_by_key(|entry| entry.index);

    let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|entry| entry.embedding).collect();
    check_vectors(&vectors, texts.len(), self.dimension)?;
    Ok(vectors)
  }
}
