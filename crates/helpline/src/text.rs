//! Text normalization, content hashing and record validation

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static METADATA_LINE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?im)^[ \t]*(created by|last updated|solution id|category):.*$").unwrap()
});
static INLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\f\v]+").unwrap());
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strip markup and source boilerplate, then collapse whitespace
pub fn normalize(text: &str) -> String {
  let without_tags = HTML_TAG.replace_all(text, " ");
  let decoded = decode_entities(&without_tags);
  let without_metadata = METADATA_LINE.replace_all(&decoded, "");

  let lines: Vec<String> = without_metadata
    .lines()
    .map(|line| INLINE_SPACE.replace_all(line, " ").trim().to_string())
    .collect();

  BLANK_RUN.replace_all(&lines.join("\n"), "\n\n").trim().to_string()
}

fn decode_entities(text: &str) -> String {
  text
    .replace("&nbsp;", " ")
    .replace("&lt;", "<")
    .replace("&gt;", ">")
    .replace("&quot;", "\"")
    .replace("&#39;", "'")
    .replace("&amp;", "&")
}

/// The exact text that is hashed and embedded for a record
pub fn embedding_text(title: &str, body: &str) -> String {
  format!("{}\n\n{}", normalize(title), normalize(body))
}

/// BLAKE3 hex digest of the normalized title and body
pub fn content_hash(title: &str, body: &str) -> String {
  blake3::hash(embedding_text(title, body).as_bytes()).to_hex().to_string()
}

/// First `max_chars` characters, cut on a char boundary
pub fn snippet(text: &str, max_chars: usize) -> String {
  match text.char_indices().nth(max_chars) {
    Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
    None => text.to_string(),
  }
}

fn default_min_chars() -> usize {
  50
}

fn default_min_words() -> usize {
  10
}

fn default_min_unique_ratio() -> f32 {
  0.3
}

/// Minimum quality bar for a solution body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
  #[serde(default = "default_min_chars")]
  pub min_chars: usize,

  #[serde(default = "default_min_words")]
  pub min_words: usize,

  /// Share of distinct words; rejects bodies that repeat one phrase
  #[serde(default = "default_min_unique_ratio")]
  pub min_unique_ratio: f32,
}

impl Default for Validation {
  fn default() -> Self {
    Self {
      min_chars: default_min_chars(),
      min_words: default_min_words(),
      min_unique_ratio: default_min_unique_ratio(),
    }
  }
}

impl Validation {
  /// Accept everything that is not empty
  pub fn lenient() -> Self {
    Self { min_chars: 1, min_words: 1, min_unique_ratio: 0.0 }
  }

  /// Check an already-normalized body
  pub fn check(&self, body: &str) -> Result<(), String> {
    if body.trim().is_empty() {
      return Err("body is empty after normalization".to_string());
    }

    let chars = body.chars().count();
    if chars < self.min_chars {
      return Err(format!("body too short ({chars} < {} chars)", self.min_chars));
    }

    let words: Vec<String> = body.split_whitespace().map(str::to_lowercase).collect();
    if words.len() < self.min_words {
      return Err(format!("body too short ({} < {} words)", words.len(), self.min_words));
    }

    let unique: HashSet<&String> = words.iter().collect();
    let ratio = unique.len() as f32 / words.len() as f32;
    if ratio < self.min_unique_ratio {
      return Err(format!("body too repetitive ({:.0}% unique words)", ratio * 100.0));
    }

    Ok(())
  }
}
