//! REST knowledge-base client
//!
//! `GET {base_url}{solutions_path}?limit=&offset=&modifiedSince=&sort=lastModified`
//! with a bearer token. Payloads are parsed leniently because upstream field names
//! vary between deployments; entries that cannot be parsed come back as rejected
//! records instead of failing the page.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use super::{RejectedRecord, SourceClient, SourcePage};
use crate::config::SourceConfig;
use crate::error::{ConfigError, SourceError};
use crate::models::{Category, SolutionRecord};
use crate::retry::retry_after_header;

const USER_AGENT: &str = concat!("helpline/", env!("CARGO_PKG_VERSION"));

pub struct HttpSource {
  client: Client,
  base_url: String,
  endpoint: String,
  page_size: usize,
  page_delay: Duration,
}

impl HttpSource {
  pub fn from_config(config: &SourceConfig) -> Result<Self, ConfigError> {
    let base_url = config
      .base_url
      .as_deref()
      .map(|url| url.trim_end_matches('/').to_string())
      .filter(|url| !url.is_empty())
      .ok_or_else(|| ConfigError::Invalid("source.base_url is required for the http source".into()))?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(key) = config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
      let auth = HeaderValue::from_str(&format!("Bearer {key}"))
        .map_err(|_| ConfigError::Invalid("source API key is not a valid header".into()))?;
      headers.insert(AUTHORIZATION, auth);
    }

    let client = Client::builder()
      .default_headers(headers)
      .user_agent(USER_AGENT)
      .build()
      .map_err(|e| ConfigError::Invalid(format!("failed to build source HTTP client: {e}")))?;

    let path = format!("/{}", config.solutions_path.trim_start_matches('/'));
    Ok(Self {
      client,
      endpoint: format!("{base_url}{path}"),
      base_url,
      page_size: config.page_size.max(1),
      page_delay: Duration::from_millis(config.page_delay_ms),
    })
  }

  fn query_params(&self, modified_since: Option<DateTime<Utc>>, offset: usize) -> Vec<(&'static str, String)> {
    let mut params = vec![
      ("limit", self.page_size.to_string()),
      ("offset", offset.to_string()),
      ("sort", "lastModified".to_string()),
    ];
    if let Some(since) = modified_since {
      params.push(("modifiedSince", since.to_rfc3339_opts(SecondsFormat::Millis, true)));
    }
    params
  }
}

/// Map a non-success HTTP status to the source error taxonomy
fn status_error(status: StatusCode, headers: &HeaderMap, body: String) -> SourceError {
  if status == StatusCode::TOO_MANY_REQUESTS {
    SourceError::RateLimited { retry_after: retry_after_header(headers) }
  } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
    SourceError::Unavailable(format!("HTTP {status}: {body}"))
  } else {
    SourceError::Rejected { status: status.as_u16(), message: body }
  }
}

fn parse_offset(token: Option<&str>) -> Result<usize, SourceError> {
  match token {
    None => Ok(0),
    Some(token) => {
      token.parse().map_err(|_| SourceError::Malformed(format!("invalid page token '{token}'")))
    }
  }
}

/// First non-empty string among `keys`
fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
  keys.iter().find_map(|key| match value.get(key)? {
    Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  })
}

fn parse_tags(value: Option<&Value>) -> Vec<String> {
  match value {
    Some(Value::Array(items)) => items
      .iter()
      .filter_map(Value::as_str)
      .map(str::trim)
      .filter(|tag| !tag.is_empty())
      .map(String::from)
      .collect(),
    Some(Value::String(joined)) => joined
      .split(',')
      .map(str::trim)
      .filter(|tag| !tag.is_empty())
      .map(String::from)
      .collect(),
    _ => Vec::new(),
  }
}

/// Turn one feed entry into a record
fn parse_solution(value: &Value, base_url: &str) -> Result<SolutionRecord, RejectedRecord> {
  let id = string_field(value, &["id", "solutionId"]);
  let reject = |reason: &str| RejectedRecord { id: id.clone(), reason: reason.to_string() };

  let Some(record_id) = id.clone() else {
    return Err(reject("missing id"));
  };

  let modified = string_field(value, &["updatedAt", "lastModified"])
    .ok_or_else(|| reject("missing lastModified timestamp"))?;
  let last_modified = DateTime::parse_from_rfc3339(&modified)
    .map(|ts| ts.with_timezone(&Utc))
    .map_err(|e| reject(&format!("invalid timestamp '{modified}': {e}")))?;

  let title = string_field(value, &["title", "name"]).unwrap_or_else(|| "Untitled Solution".into());
  let body = string_field(value, &["content", "body", "description"]).unwrap_or_default();
  let category = string_field(value, &["category", "type"])
    .map(|label| Category::parse_lenient(&label))
    .unwrap_or(Category::General);
  let url = string_field(value, &["url", "link"])
    .unwrap_or_else(|| format!("{base_url}/solutions/{record_id}"));

  let mut record = SolutionRecord::new(record_id, title, body, category, last_modified)
    .with_tags(parse_tags(value.get("tags")))
    .with_url(url);
  record.declared_hash = string_field(value, &["contentHash"]);
  Ok(record)
}

/// Parse a response body, either `{"solutions": [...], "totalCount": n}` or a bare array
fn parse_page(body: &Value, base_url: &str, offset: usize, page_size: usize) -> Result<SourcePage, SourceError> {
  let entries = match body {
    Value::Array(items) => items,
    Value::Object(map) => match map.get("solutions").or_else(|| map.get("items")) {
      Some(Value::Array(items)) => items,
      _ => return Err(SourceError::Malformed("response has no solutions array".into())),
    },
    _ => return Err(SourceError::Malformed("response is not a JSON object or array".into())),
  };

  let mut page = SourcePage::default();
  for entry in entries {
    match parse_solution(entry, base_url) {
      Ok(record) => page.records.push(record),
      Err(rejected) => page.rejected.push(rejected),
    }
  }

  let seen = offset + entries.len();
  let total = body.get("totalCount").and_then(Value::as_u64).map(|n| n as usize);
  let more = match total {
    Some(total) => seen < total && !entries.is_empty(),
    None => entries.len() >= page_size,
  };
  page.next_page_token = more.then(|| seen.to_string());

  page.records.sort_by(|a, b| a.last_modified.cmp(&b.last_modified).then_with(|| a.id.cmp(&b.id)));
  Ok(page)
}

#[async_trait]
impl SourceClient for HttpSource {
  fn name(&self) -> String {
    format!("http:{}", self.base_url)
  }

  async fn fetch_page(
    &self,
    modified_since: Option<DateTime<Utc>>,
    page_token: Option<String>,
  ) -> Result<SourcePage, SourceError> {
    let offset = parse_offset(page_token.as_deref())?;
    if offset > 0 && !self.page_delay.is_zero() {
      tokio::time::sleep(self.page_delay).await;
    }

    herald::verbose!("fetching solutions offset={offset} since={modified_since:?}");
    let response = self
      .client
      .get(&self.endpoint)
      .query(&self.query_params(modified_since, offset))
      .send()
      .await
      .map_err(|e| SourceError::Unavailable(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let headers = response.headers().clone();
      let body = response.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
      return Err(status_error(status, &headers, body));
    }

    let body: Value =
      response.json().await.map_err(|e| SourceError::Malformed(format!("invalid JSON: {e}")))?;
    let page = parse_page(&body, &self.base_url, offset, self.page_size)?;

    for rejected in &page.rejected {
      herald::warn!("rejected source entry {:?}: {}", rejected.id, rejected.reason);
    }
    Ok(page)
  }
}
