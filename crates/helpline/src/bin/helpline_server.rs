//! Helpline REST Server
//!
//! Runs the scheduled knowledge-base sync and serves retrieval and sync control over
//! HTTP until interrupted.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use helpline::config::Config;
use helpline::server::{start_server, AppState};
use helpline::sync::Scheduler;

#[derive(Parser)]
#[command(name = "helpline_server")]
#[command(about = "Helpline sync daemon and REST API server")]
#[command(version)]
struct Args {
  /// YAML configuration file
  #[arg(short, long, env = "HELPLINE_CONFIG")]
  config: Option<PathBuf>,

  /// Server bind address, overrides server.bind
  #[arg(long)]
  bind: Option<SocketAddr>,

  /// Enable verbose logging
  #[arg(short, long)]
  verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Err(e) = herald::init_tracing(args.verbose) {
    herald::warn!("tracing already initialised: {e}");
  }

  let config = Config::load(args.config.as_deref())?;
  let bind = args.bind.unwrap_or(config.server.bind);

  herald::info!("Starting helpline server v{}", env!("CARGO_PKG_VERSION"));
  herald::info!("Data directory: {}", config.data_dir().display());

  let shutdown = CancellationToken::new();
  let state = AppState::build(&config, shutdown.clone()).await?;

  let scheduler = Scheduler::new(Arc::clone(&state.orchestrator)).spawn(shutdown.clone());

  let signal = shutdown.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      herald::info!("shutdown requested");
    }
    signal.cancel();
  });

  let served = start_server(state, bind, shutdown.clone()).await;

  // A bind failure must also stop the scheduler
  shutdown.cancel();
  if let Err(e) = scheduler.await {
    herald::warn!("scheduler task ended abnormally: {e}");
  }

  served
}
