use anyhow::Result;
use clap::{Parser, Subcommand};
use helpline::cli::{commands, HelplineClient, DEFAULT_SERVER};
use helpline::models::Category;

#[derive(Parser)]
#[command(name = "helpline")]
#[command(about = "Helpline - knowledge-base sync and retrieval\nControls a running helpline_server")]
#[command(version)]
struct Cli {
  /// Base URL of the helpline server
  #[arg(long, global = true, env = "HELPLINE_SERVER", default_value = DEFAULT_SERVER)]
  server: String,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Start a sync run now
  Sync {
    /// Wait for the run to finish and print its report
    #[arg(short, long)]
    wait: bool,
  },
  /// Stop the active sync run after its in-flight batches
  Cancel,
  /// Forget the sync cursor so the next run re-reads everything
  Reset {
    #[arg(short, long)]
    force: bool,
  },
  /// Show server and sync status
  Status,
  /// Retrieve the solutions most relevant to a question
  Query {
    /// Query text (space-separated)
    #[arg(required = true)]
    terms: Vec<String>,
    #[arg(short = 'k', long)]
    top_k: Option<usize>,
    #[arg(long)]
    min_score: Option<f32>,
    /// Only return solutions in this category
    #[arg(short, long)]
    category: Option<Category>,
  },
  /// Show index and cache statistics
  Stats,
  /// Show one indexed solution
  Show { id: String },
  /// Test the connection to the upstream source
  Check,
  /// Show recent journal entries
  Logs {
    #[arg(short, long, default_value = "50")]
    limit: usize,
    /// debug, info, success, warn or error
    #[arg(long)]
    level: Option<String>,
  },
}

async fn handle(client: &HelplineClient, command: Command) -> Result<()> {
  match command {
    Command::Sync { wait } => commands::sync(client, wait).await,
    Command::Cancel => commands::cancel(client).await,
    Command::Reset { force } => commands::reset(client, force).await,
    Command::Status => commands::status(client).await,
    Command::Query { terms, top_k, min_score, category } => {
      commands::query(client, &terms, top_k, min_score, category).await
    }
    Command::Stats => commands::stats(client).await,
    Command::Show { id } => commands::show(client, &id).await,
    Command::Check => commands::check(client).await,
    Command::Logs { limit, level } => commands::logs(client, limit, level.as_deref()).await,
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let client = HelplineClient::new(&cli.server)?;

  handle(&client, cli.command).await
}
