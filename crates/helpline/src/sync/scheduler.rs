//! Background scheduling of sync runs

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::orchestrator::SyncOrchestrator;
use super::report::Trigger;
use crate::error::SyncError;

pub struct Scheduler {
  orchestrator: Arc<SyncOrchestrator>,
  interval: Duration,
  run_on_start: bool,
  stale_after: Duration,
}

/// True when there was never a successful sync, or the last one is too old
pub fn is_stale(
  last_success: Option<DateTime<Utc>>,
  now: DateTime<Utc>,
  stale_after: Duration,
) -> bool {
  match last_success {
    None => true,
    Some(last) => (now - last).to_std().is_ok_and(|age| age >= stale_after),
  }
}

impl Scheduler {
  pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
    let config = orchestrator.config();
    Self {
      interval: Duration::from_secs(config.interval_secs.max(1)),
      run_on_start: config.run_on_start,
      stale_after: Duration::from_secs(config.stale_after_secs),
      orchestrator,
    }
  }

  /// Whether start-up should trigger a sync right away
  pub fn needs_initial_sync(&self) -> bool {
    if !self.run_on_start {
      return false;
    }
    match self.orchestrator.status() {
      Ok(status) => is_stale(status.last_success, Utc::now(), self.stale_after),
      Err(e) => {
        herald::warn!("cannot read sync state ({e}); syncing on start-up");
        true
      }
    }
  }

  pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(self.run(shutdown))
  }

  /// Tick every `interval` until `shutdown` fires
  pub async fn run(self, shutdown: CancellationToken) {
    herald::info!("sync scheduler started (every {}s)", self.interval.as_secs());

    if self.needs_initial_sync() {
      self.tick(Trigger::Startup).await;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = shutdown.cancelled() => break,
        _ = ticker.tick() => self.tick(Trigger::Scheduled).await,
      }
    }

    herald::info!("sync scheduler stopped");
  }

  async fn tick(&self, trigger: Trigger) {
    match self.orchestrator.run(trigger).await {
      Ok(report) => herald::debug!("{}", report.summary()),
      Err(SyncError::AlreadyRunning) => {
        herald::info!("sync already running; skipping {trigger:?} run")
      }
      Err(e) => herald::error!("{trigger:?} sync failed: {e}"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_staleness() {
    let now = Utc::now();
    let hour = Duration::from_secs(3600);

    assert!(is_stale(None, now, hour));
    assert!(!is_stale(Some(now - chrono::Duration::minutes(5)), now, hour));
    assert!(is_stale(Some(now - chrono::Duration::hours(2)), now, hour));
    // Clock skew: a success "in the future" is fresh
    assert!(!is_stale(Some(now + chrono::Duration::minutes(1)), now, hour));
  }
}
