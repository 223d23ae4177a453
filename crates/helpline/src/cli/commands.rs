//! CLI command implementations; each talks to a running helpline server

use anyhow::{anyhow, Result};
use colored::*;
use std::time::Duration;

use super::client::HelplineClient;
use super::display;
use crate::models::{Category, SearchFilters};
use crate::retrieval::RetrievalRequest;

const WAIT_POLL: Duration = Duration::from_millis(500);

/// Start a sync; with `wait`, poll until it finishes and print its report
pub async fn sync(client: &HelplineClient, wait: bool) -> Result<()> {
  let started = client.trigger_sync().await?;
  println!("{} sync run {}", "Started".green().bold(), started.run_id.to_string().bright_blue());

  if !wait {
    return Ok(());
  }

  loop {
    tokio::time::sleep(WAIT_POLL).await;
    let status = client.sync_status().await?.sync;

    let still_running = status.running.as_ref().is_some_and(|run| run.run_id == started.run_id);
    if still_running {
      continue;
    }

    match status.last_report.filter(|report| report.run_id == started.run_id) {
      Some(report) => display::display_report(&report),
      None => println!("Run {} finished; no report available", started.run_id),
    }
    return Ok(());
  }
}

pub async fn cancel(client: &HelplineClient) -> Result<()> {
  if client.cancel_sync().await?.cancelled {
    println!("{} the active run stops after its in-flight batches", "Cancelling:".yellow().bold());
  } else {
    println!("No sync in progress");
  }
  Ok(())
}

pub async fn reset(client: &HelplineClient, force: bool) -> Result<()> {
  if !force {
    return Err(anyhow!("reset forgets the cursor and triggers a full re-sync; pass --force to confirm"));
  }
  client.reset_sync().await?;
  println!("{} the next sync re-reads the whole feed", "Reset:".green().bold());
  Ok(())
}

pub async fn status(client: &HelplineClient) -> Result<()> {
  let server = client.status().await?;
  println!(
    "{} v{} at {} (up {}s)",
    "helpline".bold(),
    server.version,
    client.base_url(),
    server.uptime_secs
  );
  println!("Source: {}, provider: {}, index: {}", server.source, server.provider, server.index);
  let label = if server.status == "healthy" { server.status.green().bold() } else { server.status.red().bold() };
  println!("Health: {label}");
  display::display_components(&server.components);
  println!();

  let sync = client.sync_status().await?.sync;
  display::display_sync_status(&sync);
  Ok(())
}

pub async fn query(
  client: &HelplineClient,
  terms: &[String],
  top_k: Option<usize>,
  min_score: Option<f32>,
  category: Option<Category>,
) -> Result<()> {
  let text = terms.join(" ");
  let request = RetrievalRequest {
    query: text,
    top_k,
    min_score,
    filters: SearchFilters { category, ..SearchFilters::default() },
  };

  let response = client.retrieve(&request).await?;
  if response.results.is_empty() {
    println!("No matching solutions");
    return Ok(());
  }

  for (position, result) in response.results.iter().enumerate() {
    display::display_result(position + 1, result, terms);
  }
  Ok(())
}

pub async fn stats(client: &HelplineClient) -> Result<()> {
  let response = client.index_stats().await?;
  display::display_stats(&response.stats);
  Ok(())
}

pub async fn show(client: &HelplineClient, id: &str) -> Result<()> {
  let response = client.document(id).await?;
  display::display_document(&response.document);
  Ok(())
}

/// Fails when the server cannot reach its upstream source
pub async fn check(client: &HelplineClient) -> Result<()> {
  let response = client.check_source().await?;
  if response.connected {
    println!("{} {} is reachable", "Connected:".green().bold(), response.source);
    return Ok(());
  }
  let reason = response.error.unwrap_or_else(|| "no reason given".to_string());
  Err(anyhow!("cannot reach {}: {reason}", response.source))
}

pub async fn logs(client: &HelplineClient, limit: usize, level: Option<&str>) -> Result<()> {
  let response = client.logs(limit, level).await?;

  if response.logs.is_empty() {
    println!("No logs found.");
    return Ok(());
  }

  for entry in &response.logs {
    display::display_log(entry);
  }
  Ok(())
}
