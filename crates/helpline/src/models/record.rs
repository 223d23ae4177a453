//! Solution records as they arrive from the source system

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::text;

/// Classification tag of a solution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
  Authentication,
  Hardware,
  Network,
  Email,
  Software,
  DataManagement,
  Security,
  General,
}

impl Category {
  pub const ALL: [Category; 8] = [
    Category::Authentication,
    Category::Hardware,
    Category::Network,
    Category::Email,
    Category::Software,
    Category::DataManagement,
    Category::Security,
    Category::General,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Category::Authentication => "authentication",
      Category::Hardware => "hardware",
      Category::Network => "network",
      Category::Email => "email",
      Category::Software => "software",
      Category::DataManagement => "data_management",
      Category::Security => "security",
      Category::General => "general",
    }
  }

  /// Upstream labels are free text; anything unrecognized lands in `General`
  pub fn parse_lenient(label: &str) -> Category {
    label.parse().unwrap_or(Category::General)
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Category {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let key: String =
      s.chars().filter(|c| !matches!(c, ' ' | '_' | '-')).collect::<String>().to_lowercase();

    match key.as_str() {
      "authentication" | "auth" | "account" | "accounts" => Ok(Category::Authentication),
      "hardware" => Ok(Category::Hardware),
      "network" | "networking" => Ok(Category::Network),
      "email" | "mail" => Ok(Category::Email),
      "software" | "application" | "applications" => Ok(Category::Software),
      "datamanagement" | "data" | "backup" => Ok(Category::DataManagement),
      "security" => Ok(Category::Security),
      "general" => Ok(Category::General),
      _ => Err(format!("unknown category '{s}'")),
    }
  }
}

/// A knowledge-base solution; `id` is the stable external key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SolutionRecord {
  pub id: String,
  pub title: String,
  pub body: String,
  pub category: Category,
  pub last_modified: DateTime<Utc>,

  #[serde(default)]
  pub tags: Vec<String>,

  #[serde(default)]
  pub url: Option<String>,

  /// Hash supplied by the source, checked against the computed one
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub declared_hash: Option<String>,
}

impl SolutionRecord {
  pub fn new(
    id: impl Into<String>,
    title: impl Into<String>,
    body: impl Into<String>,
    category: Category,
    last_modified: DateTime<Utc>,
  ) -> Self {
    Self {
      id: id.into(),
      title: title.into(),
      body: body.into(),
      category,
      last_modified,
      tags: Vec::new(),
      url: None,
      declared_hash: None,
    }
  }

  pub fn with_tags<I, S>(mut self, tags: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.tags = tags.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.url = Some(url.into());
    self
  }

  /// Deterministic hash of the normalized title and body
  pub fn content_hash(&self) -> String {
    text::content_hash(&self.title, &self.body)
  }

  /// Text handed to the embedding provider
  pub fn embedding_text(&self) -> String {
    text::embedding_text(&self.title, &self.body)
  }

  /// A declared hash that disagrees with the computed one
  pub fn hash_conflict(&self, computed: &str) -> Option<&str> {
    self.declared_hash.as_deref().filter(|declared| !declared.eq_ignore_ascii_case(computed))
  }
}
