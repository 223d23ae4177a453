//! Run journal for long-lived services
//!
//! Append-only JSONL file shared behind an async mutex. Each entry carries a level,
//! the emitting component, an optional run id and free-form structured fields, so a
//! service can record what each background run did and serve it back later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "schemars")]
use schemars::JsonSchema;

// Types and Data Structures
// =========================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum EntryLevel {
  Debug,
  Info,
  Success,
  Warn,
  Error,
}

impl EntryLevel {
  /// Console level used when echoing an entry
  pub fn console(self) -> crate::Level {
    match self {
      EntryLevel::Debug => crate::Level::Debug,
      EntryLevel::Info => crate::Level::Info,
      EntryLevel::Success => crate::Level::Success,
      EntryLevel::Warn => crate::Level::Warn,
      EntryLevel::Error => crate::Level::Error,
    }
  }
}

impl std::str::FromStr for EntryLevel {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "debug" => Ok(EntryLevel::Debug),
      "info" => Ok(EntryLevel::Info),
      "success" => Ok(EntryLevel::Success),
      "warn" | "warning" => Ok(EntryLevel::Warn),
      "error" => Ok(EntryLevel::Error),
      other => Err(format!("unknown journal level '{other}'")),
    }
  }
}

/// A single journal line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
pub struct JournalEntry {
  pub timestamp: DateTime<Utc>,
  pub level: EntryLevel,
  pub component: String,
  pub message: String,

  /// Background run this entry belongs to
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub run_id: Option<String>,

  /// Structured payload (counts, cursors, error lists)
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fields: Option<serde_json::Value>,
}

struct JournalInner {
  path: PathBuf,
  silent: bool,
}

/// Thread-safe journal handle; clones share the same file
#[derive(Clone)]
pub struct Journal {
  inner: Arc<tokio::sync::Mutex<JournalInner>>,
}

// File Operations
// ===============

impl JournalInner {
  fn open(path: &Path, silent: bool) -> std::io::Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    // Create but never truncate
    if !path.exists() {
      File::create(path)?;
    }

    Ok(Self { path: path.to_path_buf(), silent })
  }

  fn append(&mut self, entry: &JournalEntry) -> std::io::Result<()> {
    let line = serde_json::to_string(entry)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
    writeln!(file, "{line}")?;
    file.flush()
  }

  fn recent(&self, limit: Option<usize>, level: Option<EntryLevel>) -> std::io::Result<Vec<JournalEntry>> {
    if !self.path.exists() {
      return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(&self.path)?);
    let mut entries = Vec::new();

    for line in reader.lines() {
      let line = line?;
      if line.trim().is_empty() {
        continue;
      }

      // Malformed lines are skipped, the journal is best effort
      let Ok(entry) = serde_json::from_str::<JournalEntry>(&line) else {
        continue;
      };

      if level.is_none_or(|wanted| entry.level == wanted) {
        entries.push(entry);
      }
    }

    // Newest first; entries sharing a timestamp keep reverse file order
    entries.reverse();
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    if let Some(limit) = limit {
      entries.truncate(limit);
    }

    Ok(entries)
  }
}

// Core API
// ========

impl Journal {
  /// Open (or create) a journal that also echoes entries to the console
  pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
    Self::open_with_silent(path, false)
  }

  pub fn open_with_silent<P: AsRef<Path>>(path: P, silent: bool) -> std::io::Result<Self> {
    let inner = JournalInner::open(path.as_ref(), silent)?;
    Ok(Self { inner: Arc::new(tokio::sync::Mutex::new(inner)) })
  }

  /// Append an entry, returning any I/O failure
  pub async fn append(&self, entry: JournalEntry) -> std::io::Result<()> {
    let mut guard = self.inner.lock().await;
    guard.append(&entry)?;

    if !guard.silent {
      crate::emit(entry.level.console(), &format!("[{}] {}", entry.component, entry.message));
    }
    Ok(())
  }

  /// Append a plain message (fire-and-forget)
  pub async fn record(&self, level: EntryLevel, component: &str, message: &str) {
    self.record_with(level, component, message, None, None).await;
  }

  /// Append a message tied to a run, with structured fields (fire-and-forget)
  pub async fn record_with(
    &self,
    level: EntryLevel,
    component: &str,
    message: &str,
    run_id: Option<&str>,
    fields: Option<serde_json::Value>,
  ) {
    let entry = JournalEntry {
      timestamp: Utc::now(),
      level,
      component: component.to_string(),
      message: message.to_string(),
      run_id: run_id.map(str::to_string),
      fields,
    };

    if let Err(e) = self.append(entry).await {
      crate::warn!("journal write failed: {e}");
    }
  }

  /// The newest `limit` entries, optionally filtered by level, newest first
  pub async fn recent(
    &self,
    limit: Option<usize>,
    level: Option<EntryLevel>,
  ) -> std::io::Result<Vec<JournalEntry>> {
    let guard = self.inner.lock().await;
    guard.recent(limit, level)
  }

  pub async fn path(&self) -> PathBuf {
    self.inner.lock().await.path.clone()
  }
}

// Tests
// =====
