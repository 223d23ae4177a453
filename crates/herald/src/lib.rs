//! ## Features
//!
//! - Standard logging levels (info, warn, error, debug, verbose, success)
//! - Multi-line message support with consistent formatting
//! - All console output goes to stderr
//! - Optional hand-off to `tracing` once a subscriber is installed
//! - JSONL run journal (`journal` feature)
//!
//! ## Usage
//!
//! Call the macros with `format!` arguments: `herald::info!("indexed {} records", n)`.
//! Binaries that want structured output call [`init_tracing`] once at start-up, after which
//! every message is emitted as a `tracing` event instead of a coloured console line.

use colored::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(feature = "journal")]
pub mod journal;

static TRACING_SINK: AtomicBool = AtomicBool::new(false);
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Severity of a console message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Verbose,
  Debug,
  Info,
  Success,
  Warn,
  Error,
}

impl Level {
  fn prefix(self) -> (Color, &'static str) {
    match self {
      Level::Verbose => (Color::Cyan, "verb"),
      Level::Debug => (Color::Magenta, "debug"),
      Level::Info => (Color::Blue, "info"),
      Level::Success => (Color::Green, "sccs"),
      Level::Warn => (Color::Yellow, "warn"),
      Level::Error => (Color::Red, "error"),
    }
  }
}

/// Install a `tracing` subscriber on stderr and route all herald output through it.
///
/// `RUST_LOG` takes precedence over the `verbose` flag when set.
pub fn init_tracing(verbose: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
    .with(filter)
    .try_init()?;

  VERBOSE.store(verbose, Ordering::Relaxed);
  TRACING_SINK.store(true, Ordering::Relaxed);
  Ok(())
}

fn default_filter(verbose: bool) -> &'static str {
  if verbose {
    "debug,hyper=info,reqwest=info,lance=warn,datafusion=warn"
  } else {
    "info,lance=warn,lancedb=warn,datafusion=warn"
  }
}

/// Level a message is emitted at once tracing is installed
fn tracing_level(level: Level) -> tracing::Level {
  match level {
    // Verbose output is already gated by the flag; it must pass the `debug` filter
    Level::Verbose | Level::Debug => tracing::Level::DEBUG,
    Level::Info | Level::Success => tracing::Level::INFO,
    Level::Warn => tracing::Level::WARN,
    Level::Error => tracing::Level::ERROR,
  }
}

/// Enable or disable verbose console output
pub fn set_verbose(enabled: bool) {
  VERBOSE.store(enabled, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
  VERBOSE.load(Ordering::Relaxed)
}

/// Core logging function that handles the actual output
pub fn log(message: &str) {
  for line in message.lines() {
    eprintln!("{line}");
  }
}

/// Format a colored prefix for log messages
fn format_prefix(color: Color, prefix: &str) -> String {
  format!("[{}]{:<width$}", prefix.color(color).bold(), "", width = 7 - prefix.len() - 2)
}

/// Emit a message at the given level, one output line per message line
pub fn emit(level: Level, message: &str) {
  if level == Level::Verbose && !is_verbose() {
    return;
  }

  if TRACING_SINK.load(Ordering::Relaxed) {
    let target = tracing_level(level);
    for line in message.lines() {
      if target == tracing::Level::ERROR {
        tracing::error!("{line}");
      } else if target == tracing::Level::WARN {
        tracing::warn!("{line}");
      } else if target == tracing::Level::INFO {
        tracing::info!("{line}");
      } else {
        tracing::debug!("{line}");
      }
    }
    return;
  }

  let (color, tag) = level.prefix();
  let prefix = format_prefix(color, tag);
  for line in message.lines() {
    log(&format!("{prefix} {line}"));
  }
}

/// Only printed when verbose output is enabled
pub fn verbose(message: &str) {
  emit(Level::Verbose, message);
}

/// Info level logging - general information
pub fn info(message: &str) {
  emit(Level::Info, message);
}

/// Warning level logging - something needs attention
pub fn warn(message: &str) {
  emit(Level::Warn, message);
}

/// Error level logging - something went wrong
pub fn error(message: &str) {
  emit(Level::Error, message);
}

/// Debug level logging - detailed diagnostic information
pub fn debug(message: &str) {
  emit(Level::Debug, message);
}

/// Success level logging - something completed successfully
pub fn success(message: &str) {
  emit(Level::Success, message);
}

// Macros expand with LCOV_EXCL_LINE at call sites
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => {
    $crate::info(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! warn {
  ($($arg:tt)*) => {
    $crate::warn(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => {
    $crate::error(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! verbose {
  ($($arg:tt)*) => {
    $crate::verbose(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! debug {
  ($($arg:tt)*) => {
    $crate::debug(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => {
    $crate::success(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}
