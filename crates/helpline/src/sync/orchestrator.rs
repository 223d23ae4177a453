//! Delta sync runs
//!
//! A run walks the source feed from the stored cursor, skips records whose content hash
//! is already known, and hands the rest to the indexing pipeline in bounded batches.
//! Batches of a page may index concurrently but are committed strictly in feed order:
//! the cursor only moves past a batch once it and every batch before it succeeded, and
//! state is saved after every commit. A page that cannot be fetched aborts the run and
//! puts the cursor back where the run started.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use herald::journal::{EntryLevel, Journal};
use serde_json::json;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::report::{ActiveRun, Outcome, SyncReport, SyncStatus, Trigger};
use super::state::{StateStore, SyncState};
use crate::config::SyncConfig;
use crate::error::{RecordError, SyncError};
use crate::indexing::{IndexingPipeline, RecordOutcome};
use crate::models::SolutionRecord;
use crate::retry::RetryPolicy;
use crate::source::{Pages, SourceClient};

/// Error messages kept per report
const MAX_REPORT_ERRORS: usize = 50;

/// Dirty records of one page slice plus the newest timestamp the slice covers
#[derive(Debug, Default)]
struct PlannedBatch {
  records: Vec<SolutionRecord>,
  max_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct BatchResult {
  /// `(id, content_hash, cache_hit)`
  indexed: Vec<(String, String, bool)>,
  skipped: Vec<(String, String)>,
  /// Records still failing after every retry
  failed: Vec<(SolutionRecord, RecordError)>,
}

/// Cursor bookkeeping for one run
#[derive(Debug, Clone, Copy)]
struct Watermark {
  start: Option<DateTime<Utc>>,
  committed: Option<DateTime<Utc>>,
  /// Oldest timestamp among records left unindexed
  floor: Option<DateTime<Utc>>,
  blocked: bool,
}

impl Watermark {
  fn new(start: Option<DateTime<Utc>>) -> Self {
    Self { start, committed: None, floor: None, blocked: false }
  }

  /// A batch whose records are all indexed or skipped
  fn commit(&mut self, max_modified: Option<DateTime<Utc>>) {
    if !self.blocked {
      self.committed = self.committed.max(max_modified);
    }
  }

  /// A batch with records that exhausted their retries; nothing later may advance
  fn block(&mut self, oldest_failed: DateTime<Utc>) {
    self.blocked = true;
    self.floor = Some(self.floor.map_or(oldest_failed, |floor| floor.min(oldest_failed)));
  }

  /// No batch has been committed or blocked yet
  fn untouched(&self) -> bool {
    self.committed.is_none() && self.floor.is_none()
  }

  fn cursor(&self) -> Option<DateTime<Utc>> {
    let candidate = match (self.committed, self.floor) {
      (Some(committed), Some(floor)) => Some(committed.min(floor)),
      (committed, None) => committed,
      (None, Some(_)) => None,
    };
    self.start.max(candidate)
  }
}

/// A claimed run: holding the guard is what makes it the only active one
struct RunHandle {
  _guard: OwnedMutexGuard<()>,
  info: ActiveRun,
  cancel: CancellationToken,
}

pub struct SyncOrchestrator {
  source: Arc<dyn SourceClient>,
  pipeline: Arc<IndexingPipeline>,
  store: StateStore,
  config: SyncConfig,
  fetch_retry: RetryPolicy,
  journal: Option<Journal>,
  shutdown: CancellationToken,
  run_lock: Arc<tokio::sync::Mutex<()>>,
  active: Mutex<Option<(ActiveRun, CancellationToken)>>,
  last_report: RwLock<Option<SyncReport>>,
}

// Core API
// ========

impl SyncOrchestrator {
  pub fn new(
    source: Arc<dyn SourceClient>,
    pipeline: Arc<IndexingPipeline>,
    store: StateStore,
    config: SyncConfig,
    fetch_retry: RetryPolicy,
  ) -> Self {
    Self {
      source,
      pipeline,
      store,
      config,
      fetch_retry,
      journal: None,
      shutdown: CancellationToken::new(),
      run_lock: Arc::new(tokio::sync::Mutex::new(())),
      active: Mutex::new(None),
      last_report: RwLock::new(None),
    }
  }

  pub fn with_journal(mut self, journal: Journal) -> Self {
    self.journal = Some(journal);
    self
  }

  /// Runs observe this token (through a child) and stop between batches once it fires
  pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
    self.shutdown = shutdown;
    self
  }

  pub fn config(&self) -> &SyncConfig {
    &self.config
  }

  pub fn pipeline(&self) -> &Arc<IndexingPipeline> {
    &self.pipeline
  }

  pub fn source(&self) -> &Arc<dyn SourceClient> {
    &self.source
  }

  /// Run a sync to completion on the current task
  pub async fn run(&self, trigger: Trigger) -> Result<SyncReport, SyncError> {
    let handle = self.claim(trigger)?;
    self.execute(handle).await
  }

  /// Start a sync in the background and return its run id straight away
  pub fn trigger(self: &Arc<Self>, trigger: Trigger) -> Result<Uuid, SyncError> {
    let handle = self.claim(trigger)?;
    let run_id = handle.info.run_id;

    let orchestrator = Arc::clone(self);
    tokio::spawn(async move {
      if let Err(e) = orchestrator.execute(handle).await {
        herald::error!("sync run {run_id} failed: {e}");
      }
    });
    Ok(run_id)
  }

  /// Ask the active run to stop after its in-flight batches; false when idle
  pub fn cancel(&self) -> bool {
    let active = self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    match active.as_ref() {
      Some((run, token)) => {
        herald::info!("cancelling sync run {}", run.run_id);
        token.cancel();
        true
      }
      None => false,
    }
  }

  /// Forget cursor and known hashes so the next run re-reads the whole feed
  pub async fn reset(&self) -> Result<(), SyncError> {
    let _guard = self.run_lock.try_lock().map_err(|_| SyncError::AlreadyRunning)?;
    self.store.reset()?;

    let message = "sync state reset; next run is a full sync";
    match &self.journal {
      Some(journal) => journal.record(EntryLevel::Info, "sync", message).await,
      None => herald::info!("{message}"),
    }
    Ok(())
  }

  pub fn is_running(&self) -> bool {
    self.active.lock().map(|active| active.is_some()).unwrap_or(false)
  }

  pub fn last_report(&self) -> Option<SyncReport> {
    self.last_report.read().map(|report| report.clone()).unwrap_or_default()
  }

  pub fn status(&self) -> Result<SyncStatus, SyncError> {
    let state = self.store.load()?;
    let running = self
      .active
      .lock()
      .map(|active| active.as_ref().map(|(run, _)| run.clone()))
      .unwrap_or_default();

    Ok(SyncStatus {
      running,
      last_report: self.last_report(),
      last_success: state.last_success,
      cursor: state.cursor,
      known_documents: state.known_hashes.len(),
      interval_secs: self.config.interval_secs,
    })
  }
}

// Run lifecycle
// =============

impl SyncOrchestrator {
  fn claim(&self, trigger: Trigger) -> Result<RunHandle, SyncError> {
    let guard = self.run_lock.clone().try_lock_owned().map_err(|_| SyncError::AlreadyRunning)?;

    let info = ActiveRun { run_id: Uuid::new_v4(), trigger, started_at: Utc::now() };
    let cancel = self.shutdown.child_token();
    *self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
      Some((info.clone(), cancel.clone()));

    Ok(RunHandle { _guard: guard, info, cancel })
  }

  async fn execute(&self, handle: RunHandle) -> Result<SyncReport, SyncError> {
    let run = &handle.info;
    herald::info!("sync run {} started ({:?})", run.run_id, run.trigger);

    let (mut report, abort) = self.sync_once(run, &handle.cancel).await;
    report.started_at = run.started_at;
    report.finished_at = Utc::now();

    let level = match report.outcome {
      Outcome::Completed => EntryLevel::Success,
      Outcome::PartiallyCompleted | Outcome::Cancelled => EntryLevel::Warn,
      Outcome::Aborted => EntryLevel::Error,
    };
    let fields = serde_json::to_value(&report).ok();
    self.note(level, run, report.summary(), fields).await;

    if let Ok(mut last) = self.last_report.write() {
      *last = Some(report.clone());
    }
    *self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;

    match abort {
      Some(e) => Err(e),
      None => Ok(report),
    }
  }

  /// The run itself; always yields a report, plus the error that aborted it
  async fn sync_once(
    &self,
    run: &ActiveRun,
    cancel: &CancellationToken,
  ) -> (SyncReport, Option<SyncError>) {
    let mut report = SyncReport::new(run.run_id, run.trigger, None);

    let (mut state, rebuilding) = match self.load_state().await {
      Ok(loaded) => loaded,
      Err(e) => {
        report.outcome = Outcome::Aborted;
        push_error(&mut report, e.to_string());
        return (report, Some(e));
      }
    };
    report.cursor_before = state.cursor;
    report.cursor_after = state.cursor;

    let mut watermark = Watermark::new(state.cursor);
    let mut pages = Pages::new(self.source.as_ref(), &self.fetch_retry, state.cursor);

    let mut abort = loop {
      if cancel.is_cancelled() {
        report.outcome = Outcome::Cancelled;
        break None;
      }

      let page = match pages.next().await {
        None => break None,
        Some(Ok(page)) => page,
        Some(Err(e)) => {
          push_error(&mut report, format!("page {} fetch failed: {e}", pages.fetched() + 1));
          break Some(SyncError::from(e));
        }
      };
      report.pages += 1;

      for rejected in &page.rejected {
        report.integrity_skipped += 1;
        let message = format!("skipped unparseable entry {:?}: {}", rejected.id, rejected.reason);
        self.note(EntryLevel::Warn, run, message.clone(), None).await;
        push_error(&mut report, message);
      }

      let batches = self.plan_batches(page.records, &state, &mut report);
      if let Err(e) =
        self.process_batches(batches, run, cancel, &mut state, &mut watermark, &mut report).await
      {
        push_error(&mut report, e.to_string());
        break Some(e);
      }
    };

    if abort.is_some() {
      report.outcome = Outcome::Aborted;
    } else if report.outcome != Outcome::Cancelled {
      report.outcome =
        if report.failed_batches > 0 { Outcome::PartiallyCompleted } else { Outcome::Completed };
      state.last_success = Some(Utc::now());
    }

    // A failed page fetch leaves the cursor where the run found it; known hashes stay
    state.cursor = match abort {
      Some(SyncError::Source(_)) => report.cursor_before,
      _ => watermark.cursor(),
    };
    report.cursor_after = state.cursor;

    // A rebuild that aborts before its first commit keeps the stored state, so the
    // next run sees the empty index and starts over without lowering the saved cursor
    if abort.is_some() && rebuilding && watermark.untouched() {
      report.cursor_after = report.cursor_before;
      return (report, abort);
    }

    if let Err(e) = self.store.save(&state) {
      push_error(&mut report, e.to_string());
      if abort.is_none() {
        report.outcome = Outcome::Aborted;
        abort = Some(e.into());
      }
    }

    (report, abort)
  }

  /// Stored state, discarded when it claims documents the index no longer has.
  ///
  /// The flag marks that rebuild. Like `reset`, it is the one place the cursor may move
  /// back: once the rebuild commits a batch, the lowered cursor is saved.
  async fn load_state(&self) -> Result<(SyncState, bool), SyncError> {
    let mut state = self.store.load()?;
    if state.known_hashes.is_empty() {
      return Ok((state, false));
    }

    let stats = self.pipeline.stats().await?;
    if stats.documents == 0 {
      herald::warn!(
        "index is empty but sync state knows {} documents; running a full sync",
        state.known_hashes.len()
      );
      state.clear();
      return Ok((state, true));
    }
    Ok((state, false))
  }

  /// Split a page into batches of dirty records, counting unchanged ones
  fn plan_batches(
    &self,
    mut records: Vec<SolutionRecord>,
    state: &SyncState,
    report: &mut SyncReport,
  ) -> Vec<PlannedBatch> {
    records.sort_by(|a, b| a.last_modified.cmp(&b.last_modified).then_with(|| a.id.cmp(&b.id)));

    let batch_size = self.config.batch_size.max(1);
    let mut batches = Vec::new();
    let mut current = PlannedBatch::default();

    for record in records {
      report.records_seen += 1;
      current.max_modified = current.max_modified.max(Some(record.last_modified));

      if state.is_unchanged(&record.id, &record.content_hash()) {
        report.unchanged += 1;
        continue;
      }

      current.records.push(record);
      if current.records.len() >= batch_size {
        batches.push(std::mem::take(&mut current));
      }
    }

    // Trailing unchanged records still move the watermark
    if current.max_modified.is_some() {
      batches.push(current);
    }
    batches
  }

  /// Index batches concurrently and commit their results in feed order
  async fn process_batches(
    &self,
    batches: Vec<PlannedBatch>,
    run: &ActiveRun,
    cancel: &CancellationToken,
    state: &mut SyncState,
    watermark: &mut Watermark,
    report: &mut SyncReport,
  ) -> Result<(), SyncError> {
    let mut results = stream::iter(batches)
      .map(|batch| async move {
        // Checked before a batch starts, never while it runs
        if cancel.is_cancelled() {
          return (batch, None);
        }
        let result = self.index_batch(&batch.records).await;
        (batch, Some(result))
      })
      .buffered(self.config.concurrency.max(1));

    while let Some((batch, result)) = results.next().await {
      let result = match result {
        None => {
          report.outcome = Outcome::Cancelled;
          continue;
        }
        Some(result) => result?,
      };

      for (id, content_hash, cache_hit) in result.indexed {
        report.indexed += 1;
        report.cache_hits += usize::from(cache_hit);
        state.known_hashes.insert(id, content_hash);
      }

      for (id, reason) in result.skipped {
        report.integrity_skipped += 1;
        let message = format!("skipped solution {id}: {reason}");
        self.note(EntryLevel::Warn, run, message.clone(), None).await;
        push_error(report, message);
      }

      match result.failed.iter().map(|(record, _)| record.last_modified).min() {
        Some(oldest) => {
          report.failed_batches += 1;
          report.failed_records += result.failed.len();
          watermark.block(oldest);

          let ids: Vec<&str> = result.failed.iter().map(|(record, _)| record.id.as_str()).collect();
          let message = format!(
            "batch of {} failed for {} records after retries: {}",
            batch.records.len(),
            ids.len(),
            result.failed[0].1
          );
          self.note(EntryLevel::Error, run, message.clone(), Some(json!({ "ids": ids }))).await;
          push_error(report, message);
        }
        None => watermark.commit(batch.max_modified),
      }

      state.cursor = watermark.cursor();
      self.store.save(state)?;
    }

    Ok(())
  }

  /// Index one batch, re-submitting only the records that failed
  async fn index_batch(&self, records: &[SolutionRecord]) -> Result<BatchResult, SyncError> {
    let mut result = BatchResult::default();
    let mut pending = records.to_vec();
    let mut attempt = 0;

    while !pending.is_empty() {
      let outcomes = self.pipeline.index(&pending).await?;
      let mut retry = Vec::new();

      for (record, outcome) in pending.into_iter().zip(outcomes) {
        match outcome {
          RecordOutcome::Indexed { id, content_hash, cache_hit } => {
            result.indexed.push((id, content_hash, cache_hit))
          }
          RecordOutcome::Failed { id, error: RecordError::Integrity(reason) } => {
            result.skipped.push((id, reason))
          }
          RecordOutcome::Failed { error, .. } => retry.push((record, error)),
        }
      }

      if retry.is_empty() {
        break;
      }

      attempt += 1;
      if attempt > self.config.batch_retry.max_retries {
        result.failed = retry;
        break;
      }

      let delay = self.config.batch_retry.backoff_delay(attempt);
      herald::debug!(
        "{} records failed to index; retrying in {}ms (attempt {attempt}/{})",
        retry.len(),
        delay.as_millis(),
        self.config.batch_retry.max_retries
      );
      tokio::time::sleep(delay).await;
      pending = retry.into_iter().map(|(record, _)| record).collect();
    }

    Ok(result)
  }

  async fn note(
    &self,
    level: EntryLevel,
    run: &ActiveRun,
    message: String,
    fields: Option<serde_json::Value>,
  ) {
    match &self.journal {
      Some(journal) => {
        let run_id = run.run_id.to_string();
        journal.record_with(level, "sync", &message, Some(&run_id), fields).await;
      }
      None => herald::emit(level.console(), &message),
    }
  }
}

fn push_error(report: &mut SyncReport, message: String) {
  if report.errors.len() < MAX_REPORT_ERRORS {
    report.errors.push(message);
  }
}
