//! Run reports and status snapshots

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
  Scheduled,
  Startup,
  Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  /// Every dirty record was indexed or skipped for integrity
  Completed,
  /// At least one batch exhausted its retries
  PartiallyCompleted,
  /// A page fetch or fatal error stopped the run
  Aborted,
  Cancelled,
}

/// Summary of one sync run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyncReport {
  pub run_id: Uuid,
  pub trigger: Trigger,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub outcome: Outcome,
  pub pages: usize,
  pub records_seen: usize,
  pub unchanged: usize,
  pub indexed: usize,
  pub cache_hits: usize,
  pub integrity_skipped: usize,
  pub failed_records: usize,
  pub failed_batches: usize,
  pub cursor_before: Option<DateTime<Utc>>,
  pub cursor_after: Option<DateTime<Utc>>,
  #[serde(default)]
  pub errors: Vec<String>,
}

impl SyncReport {
  pub fn new(run_id: Uuid, trigger: Trigger, cursor: Option<DateTime<Utc>>) -> Self {
    let now = Utc::now();
    Self {
      run_id,
      trigger,
      started_at: now,
      finished_at: now,
      outcome: Outcome::Completed,
      pages: 0,
      records_seen: 0,
      unchanged: 0,
      indexed: 0,
      cache_hits: 0,
      integrity_skipped: 0,
      failed_records: 0,
      failed_batches: 0,
      cursor_before: cursor,
      cursor_after: cursor,
      errors: Vec::new(),
    }
  }

  pub fn duration_ms(&self) -> i64 {
    (self.finished_at - self.started_at).num_milliseconds()
  }

  /// One-line summary for logs
  pub fn summary(&self) -> String {
    format!(
      "sync {:?}: {} seen, {} unchanged, {} indexed ({} cached), {} skipped, {} failed in {}ms",
      self.outcome,
      self.records_seen,
      self.unchanged,
      self.indexed,
      self.cache_hits,
      self.integrity_skipped,
      self.failed_records,
      self.duration_ms()
    )
  }
}

/// The run in progress, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActiveRun {
  pub run_id: Uuid,
  pub trigger: Trigger,
  pub started_at: DateTime<Utc>,
}

/// Everything the status surface shows about sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyncStatus {
  pub running: Option<ActiveRun>,
  pub last_report: Option<SyncReport>,
  pub last_success: Option<DateTime<Utc>>,
  pub cursor: Option<DateTime<Utc>>,
  pub known_documents: usize,
  pub interval_secs: u64,
}
