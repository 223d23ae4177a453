//! Display formatting utilities for CLI output

use chrono::{DateTime, Utc};
use colored::*;
use herald::journal::{EntryLevel, JournalEntry};

use crate::indexing::IndexStats;
use crate::models::{RetrievalResult, StoredDocument};
use crate::server::types::ComponentHealth;
use crate::sync::{Outcome, SyncReport, SyncStatus};

const WRAP_WIDTH: usize = 88;

/// Highlight query terms in text, case-insensitively
pub fn highlight_keywords(text: &str, terms: &[String]) -> String {
  let mut result = text.to_string();

  let mut sorted = terms.to_vec();
  sorted.sort_by_key(|term| std::cmp::Reverse(term.len()));

  for term in sorted {
    if term.is_empty() {
      continue;
    }

    let term_lower = term.to_lowercase();
    let result_lower = result.to_lowercase();
    // Lowercasing can change byte lengths; highlight only when offsets line up
    if result_lower.len() != result.len() {
      continue;
    }

    let mut highlighted = String::new();
    let mut end = 0;
    let mut start = 0;

    while let Some(pos) = result_lower[start..].find(&term_lower) {
      let abs_pos = start + pos;
      highlighted.push_str(&result[end..abs_pos]);
      highlighted.push_str(&result[abs_pos..abs_pos + term.len()].yellow().bold().to_string());
      end = abs_pos + term.len();
      start = end;
    }

    highlighted.push_str(&result[end..]);
    result = highlighted;
  }

  result
}

/// Wrap text to fit within `width` columns
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
  let mut lines = Vec::new();

  for paragraph in text.split('\n') {
    if paragraph.trim().is_empty() {
      lines.push(String::new());
      continue;
    }

    let mut current_line = String::new();
    for word in paragraph.split_whitespace() {
      if current_line.is_empty() {
        current_line = word.to_string();
      } else if current_line.len() + 1 + word.len() <= width {
        current_line.push(' ');
        current_line.push_str(word);
      } else {
        lines.push(std::mem::take(&mut current_line));
        current_line = word.to_string();
      }
    }

    if !current_line.is_empty() {
      lines.push(current_line);
    }
  }

  lines
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
  value.map(|ts| ts.to_rfc3339()).unwrap_or_else(|| "never".to_string())
}

pub fn outcome_label(outcome: Outcome) -> ColoredString {
  match outcome {
    Outcome::Completed => "completed".green().bold(),
    Outcome::PartiallyCompleted => "partially completed".yellow().bold(),
    Outcome::Aborted => "aborted".red().bold(),
    Outcome::Cancelled => "cancelled".magenta().bold(),
  }
}

pub fn display_report(report: &SyncReport) {
  println!(
    "Run {} ({:?}): {} in {}ms",
    report.run_id.to_string().bright_blue(),
    report.trigger,
    outcome_label(report.outcome),
    report.duration_ms()
  );
  println!(
    "  pages {}, seen {}, unchanged {}, indexed {} ({} from cache)",
    report.pages, report.records_seen, report.unchanged, report.indexed, report.cache_hits
  );
  println!(
    "  integrity skipped {}, failed records {}, failed batches {}",
    report.integrity_skipped, report.failed_records, report.failed_batches
  );
  println!("  cursor {} -> {}", timestamp(report.cursor_before), timestamp(report.cursor_after));

  for error in &report.errors {
    println!("  {} {}", "└─".white().dimmed(), error.red());
  }
}

pub fn display_sync_status(status: &SyncStatus) {
  match &status.running {
    Some(run) => println!(
      "{} run {} ({:?}) since {}",
      "Running:".green().bold(),
      run.run_id,
      run.trigger,
      run.started_at.to_rfc3339()
    ),
    None => println!("{} no sync in progress", "Idle:".blue().bold()),
  }

  println!("Last success:    {}", timestamp(status.last_success));
  println!("Cursor:          {}", timestamp(status.cursor));
  println!("Known documents: {}", status.known_documents);
  println!("Interval:        {}s", status.interval_secs);

  if let Some(report) = &status.last_report {
    println!();
    display_report(report);
  }
}

pub fn display_result(rank: usize, result: &RetrievalResult, terms: &[String]) {
  let header = format!(
    "{}. {} [{}] {:.3}",
    rank,
    result.metadata.title.bold(),
    result.metadata.category.as_str().cyan(),
    result.score
  );
  println!("{header}");

  let mut details = vec![format!("id {}", result.document_id)];
  details.push(format!("modified {}", result.metadata.last_modified.format("%Y-%m-%d")));
  if let Some(url) = &result.metadata.url {
    details.push(url.clone());
  }
  println!("   {}", details.join(" · ").dimmed());

  for line in wrap_text(&result.snippet, WRAP_WIDTH) {
    println!("   {}", highlight_keywords(&line, terms));
  }
  println!();
}

pub fn display_stats(stats: &IndexStats) {
  println!("Index:     {} ({} documents)", stats.index.bold(), stats.documents);
  println!("Provider:  {} ({} dimensions)", stats.provider.bold(), stats.dimension);
  println!(
    "Cache:     {} entries, {} hits, {} misses",
    stats.cache.entries, stats.cache.hits, stats.cache.misses
  );
}

pub fn display_components(components: &[ComponentHealth]) {
  for component in components {
    let mark = if component.healthy { "ok".green().bold() } else { "down".red().bold() };
    println!("  {:<11} {:<4} {}", component.name, mark, component.message);
  }
}

pub fn display_document(document: &StoredDocument) {
  println!(
    "{} [{}] {}",
    document.metadata.title.bold(),
    document.metadata.category.as_str().cyan(),
    document.id.bright_blue()
  );

  let mut details = vec![format!("modified {}", document.metadata.last_modified.to_rfc3339())];
  details.push(format!("hash {}", document.metadata.content_hash));
  details.push(format!("{} dimensions", document.dimension));
  if let Some(url) = &document.metadata.url {
    details.push(url.clone());
  }
  println!("   {}", details.join(" · ").dimmed());
  if !document.metadata.tags.is_empty() {
    println!("   tags: {}", document.metadata.tags.join(", "));
  }

  for line in wrap_text(&document.snippet, WRAP_WIDTH) {
    println!("   {line}");
  }
}

fn level_label(level: EntryLevel) -> ColoredString {
  match level {
    EntryLevel::Error => "error".red().bold(),
    EntryLevel::Warn => "warn".yellow().bold(),
    EntryLevel::Info => "info".blue().bold(),
    EntryLevel::Debug => "debug".green(),
    EntryLevel::Success => "success".bright_green().bold(),
  }
}

pub fn display_log(entry: &JournalEntry) {
  println!(
    "{} [{}] {} {}",
    entry.timestamp.to_rfc3339().cyan(),
    level_label(entry.level),
    format!("({})", entry.component).dimmed(),
    entry.message
  );

  if let Some(run_id) = &entry.run_id {
    println!("  {} run_id: {}", "└─".white().dimmed(), run_id.bright_blue());
  }
  if let Some(fields) = &entry.fields {
    println!("  {} {}", "└─".white().dimmed(), fields.to_string().dimmed());
  }
}
