//! Persisted sync state
//!
//! `{cursor, known_hashes, last_success}` as JSON, replaced atomically so a crash
//! mid-write leaves the previous state intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::StateError;
use crate::persist::write_json_atomic;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
  /// Inclusive `modified_since` for the next run
  #[serde(default)]
  pub cursor: Option<DateTime<Utc>>,

  /// Content hash of every indexed record, by id
  #[serde(default)]
  pub known_hashes: BTreeMap<String, String>,

  /// End of the last run that was not aborted or cancelled
  #[serde(default)]
  pub last_success: Option<DateTime<Utc>>,
}

impl SyncState {
  pub fn is_unchanged(&self, id: &str, content_hash: &str) -> bool {
    self.known_hashes.get(id).is_some_and(|known| known == content_hash)
  }

  /// Forget the cursor and hashes so the next run re-reads the whole feed
  pub fn clear(&mut self) {
    self.cursor = None;
    self.known_hashes.clear();
  }
}

/// Loads and saves [`SyncState`] at a fixed path
#[derive(Debug, Clone)]
pub struct StateStore {
  path: PathBuf,
}

impl StateStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// The stored state, or an empty one when nothing was saved yet
  pub fn load(&self) -> Result<SyncState, StateError> {
    if !self.path.exists() {
      return Ok(SyncState::default());
    }

    let content = std::fs::read_to_string(&self.path)
      .map_err(|source| StateError::Io { path: self.path.clone(), source })?;
    serde_json::from_str(&content)
      .map_err(|source| StateError::Corrupt { path: self.path.clone(), source })
  }

  pub fn save(&self, state: &SyncState) -> Result<(), StateError> {
    write_json_atomic(&self.path, state)
      .map_err(|source| StateError::Io { path: self.path.clone(), source })
  }

  /// Clear cursor and hashes, keeping `last_success`
  pub fn reset(&self) -> Result<SyncState, StateError> {
    let mut state = self.load().unwrap_or_default();
    state.clear();
    self.save(&state)?;
    Ok(state)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use tempfile::TempDir;

  fn populated() -> SyncState {
    let mut state = SyncState {
      cursor: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
      ..SyncState::default()
    };
    state.known_hashes.insert("A1".into(), "h1".into());
    state
  }

  #[test]
  fn test_missing_file_is_empty_state() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("sync_state.json"));

    assert_eq!(store.load().unwrap(), SyncState::default());
  }

  #[test]
  fn test_round_trip_and_unchanged_check() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("nested").join("sync_state.json"));

    store.save(&populated()).unwrap();
    let loaded = store.load().unwrap();

    assert_eq!(loaded, populated());
    assert!(loaded.is_unchanged("A1", "h1"));
    assert!(!loaded.is_unchanged("A1", "h2"));
    assert!(!loaded.is_unchanged("B1", "h1"));
  }

  #[test]
  fn test_stale_temp_file_does_not_break_save() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sync_state.json");
    std::fs::write(dir.path().join(".tmpXYZ123"), "{ half written").unwrap();
    let store = StateStore::new(&path);

    store.save(&populated()).unwrap();

    assert_eq!(store.load().unwrap(), populated());
  }

  #[test]
  fn test_corrupt_state_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sync_state.json");
    std::fs::write(&path, "not json").unwrap();

    assert!(matches!(StateStore::new(&path).load(), Err(StateError::Corrupt { .. })));
  }

  #[test]
  fn test_reset_keeps_last_success() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("sync_state.json"));
    let mut state = populated();
    state.last_success = Some(Utc::now());
    store.save(&state).unwrap();

    let reset = store.reset().unwrap();

    assert_eq!(reset.cursor, None);
    assert!(reset.known_hashes.is_empty());
    assert_eq!(store.load().unwrap().last_success, state.last_success);
  }
}
