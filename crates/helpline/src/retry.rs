//! One retry policy for every outbound call
//!
//! The policy wraps each attempt in a per-call timeout, classifies failures through
//! [`Classify`], backs off exponentially with jitter on transient errors, waits for the
//! upstream-provided delay on rate limits, and gives up immediately on fatal or
//! data-integrity errors.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::{Classify, ErrorClass};

fn default_max_retries() -> u32 {
  3
}

fn default_initial_delay_ms() -> u64 {
  500
}

fn default_max_delay_ms() -> u64 {
  30_000
}

fn default_backoff_multiplier() -> f64 {
  2.0
}

fn default_use_jitter() -> bool {
  true
}

fn default_rate_limit_delay_ms() -> u64 {
  10_000
}

fn default_max_rate_limit_delay_ms() -> u64 {
  300_000
}

fn default_call_timeout_secs() -> u64 {
  30
}

/// Retry settings; also deserialized straight from the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
  /// Retries after the first attempt
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,

  #[serde(default = "default_initial_delay_ms")]
  pub initial_delay_ms: u64,

  #[serde(default = "default_max_delay_ms")]
  pub max_delay_ms: u64,

  #[serde(default = "default_backoff_multiplier")]
  pub backoff_multiplier: f64,

  /// Scale each delay by a random factor in [0.5, 1.0]
  #[serde(default = "default_use_jitter")]
  pub use_jitter: bool,

  /// Floor for rate-limit waits when the upstream gives no Retry-After
  #[serde(default = "default_rate_limit_delay_ms")]
  pub rate_limit_delay_ms: u64,

  /// Ceiling for any rate-limit wait, including an upstream Retry-After
  #[serde(default = "default_max_rate_limit_delay_ms")]
  pub max_rate_limit_delay_ms: u64,

  /// Timeout for a single attempt; 0 disables it
  #[serde(default = "default_call_timeout_secs")]
  pub call_timeout_secs: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: default_max_retries(),
      initial_delay_ms: default_initial_delay_ms(),
      max_delay_ms: default_max_delay_ms(),
      backoff_multiplier: default_backoff_multiplier(),
      use_jitter: default_use_jitter(),
      rate_limit_delay_ms: default_rate_limit_delay_ms(),
      max_rate_limit_delay_ms: default_max_rate_limit_delay_ms(),
      call_timeout_secs: default_call_timeout_secs(),
    }
  }
}

impl RetryPolicy {
  /// No waiting between attempts; handy for tests and tight loops
  pub fn immediate(max_retries: u32) -> Self {
    Self {
      max_retries,
      initial_delay_ms: 0,
      max_delay_ms: 0,
      backoff_multiplier: 1.0,
      use_jitter: false,
      rate_limit_delay_ms: 0,
      max_rate_limit_delay_ms: default_max_rate_limit_delay_ms(),
      call_timeout_secs: 0,
    }
  }

  pub fn with_max_retries(mut self, max_retries: u32) -> Self {
    self.max_retries = max_retries;
    self
  }

  pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
    self.call_timeout_secs = timeout.as_secs();
    self
  }

  pub fn without_jitter(mut self) -> Self {
    self.use_jitter = false;
    self
  }

  pub fn call_timeout(&self) -> Option<Duration> {
    (self.call_timeout_secs > 0).then(|| Duration::from_secs(self.call_timeout_secs))
  }

  /// Delay before retry number `attempt` (1-based), jitter included
  pub fn backoff_delay(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
    let capped = raw.min(self.max_delay_ms as f64).max(0.0) as u64;

    Duration::from_millis(if self.use_jitter { apply_jitter(capped) } else { capped })
  }

  fn rate_limit_delay(&self, attempt: u32, requested: Option<Duration>) -> Duration {
    let wait = requested.unwrap_or_else(|| {
      Duration::from_millis(self.rate_limit_delay_ms).max(self.backoff_delay(attempt))
    });
    wait.min(Duration::from_millis(self.max_rate_limit_delay_ms))
  }

  /// Run `operation` until it succeeds, fails non-retryably, or retries run out
  pub async fn run<F, Fut, T, E>(&self, label: &str, mut operation: F) -> Result<T, E>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify,
  {
    let mut attempt = 0;

    loop {
      let outcome = match self.call_timeout() {
        Some(limit) => match tokio::time::timeout(limit, operation()).await {
          Ok(result) => result,
          Err(_) => Err(E::timed_out(limit)),
        },
        None => operation().await,
      };

      let err = match outcome {
        Ok(value) => {
          if attempt > 0 {
            herald::debug!("{label} succeeded after {attempt} retries");
          }
          return Ok(value);
        }
        Err(err) => err,
      };

      let class = err.class();
      if !class.is_retryable() {
        return Err(err);
      }

      attempt += 1;
      if attempt > self.max_retries {
        herald::warn!("{label} failed after {attempt} attempts: {err}");
        return Err(err);
      }

      let wait = match class {
        ErrorClass::RateLimited => self.rate_limit_delay(attempt, err.retry_after()),
        _ => self.backoff_delay(attempt),
      };

      herald::debug!(
        "{label} failed (attempt {attempt}/{}): {err}; retrying in {}ms",
        self.max_retries + 1,
        wait.as_millis()
      );
      tokio::time::sleep(wait).await;
    }
  }
}

/// Parse a `Retry-After` header given in whole seconds
pub fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
  headers
    .get(reqwest::header::RETRY_AFTER)
    .and_then(|value| value.to_str().ok())
    .and_then(|value| value.trim().parse::<u64>().ok())
    .map(Duration::from_secs)
}

/// Scale a delay by a random factor between 50% and 100%
fn apply_jitter(delay_ms: u64) -> u64 {
  if delay_ms == 0 {
    return 0;
  }
  let factor: f64 = rand::rng().random_range(0.5..=1.0);
  (delay_ms as f64 * factor) as u64
}
