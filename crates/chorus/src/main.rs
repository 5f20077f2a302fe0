use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use chorus::cli::commands;
use chorus::{ChorusConfig, CommunityStorage, Platform};

#[derive(Parser)]
#[command(name = "chorus")]
#[command(about = "Chorus - Community Content Store\nDurable records with semantic similarity search")]
#[command(version)]
struct Cli {
  /// Path to a YAML or JSON config file
  #[arg(short, long, global = true, env = "CHORUS_CONFIG")]
  config: Option<PathBuf>,

  /// Show detailed log output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

/// Optional platform restriction
#[derive(Args)]
struct PlatformFilter {
  /// Only include records from this platform
  #[arg(short, long)]
  platform: Option<Platform>,
}

#[derive(Subcommand)]
enum Command {
  /// Show the similarity index state
  Status,
  /// Rebuild the similarity index from stored records
  Rebuild,
  /// Count stored records
  Count {
    #[command(flatten)]
    filter: PlatformFilter,
  },
  /// List the newest records of a platform
  List {
    platform: Platform,
    #[arg(short, long, default_value = "20")]
    limit: u32,
    #[arg(short, long, default_value = "0")]
    offset: u32,
  },
  /// List records in an inclusive RFC 3339 time range, newest first
  Range {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[command(flatten)]
    filter: PlatformFilter,
    #[arg(short, long, default_value = "100")]
    limit: u32,
  },
  /// Find records similar to an embedding given as "[0.1, 0.2]" or "0.1,0.2"
  Search {
    embedding: String,
    #[arg(short, long)]
    limit: Option<usize>,
    #[arg(short, long)]
    threshold: Option<f32>,
    #[command(flatten)]
    filter: PlatformFilter,
  },
  /// Find records whose content contains every term
  Grep {
    #[arg(required = true)]
    terms: Vec<String>,
    #[arg(short, long, default_value = "20")]
    limit: u32,
    #[command(flatten)]
    filter: PlatformFilter,
  },
  /// Import records from a JSON Lines file
  Import { file: PathBuf },
  /// Show a single record
  Get {
    id: String,
    /// Print the record as JSON
    #[arg(long)]
    json: bool,
  },
  /// Delete a record
  Delete {
    id: String,
    /// Skip confirmation prompt
    #[arg(short, long)]
    force: bool,
  },
  /// Show operation counters and per-platform record counts
  Stats {
    /// Print the statistics as JSON
    #[arg(long)]
    json: bool,
  },
}

async fn handle(storage: &CommunityStorage, command: Command) -> Result<()> {
  match command {
    Command::Status => commands::status(storage).await,
    Command::Rebuild => commands::rebuild(storage).await,
    Command::Count { filter } => commands::count(storage, filter.platform.as_ref()).await,
    Command::List { platform, limit, offset } => commands::list(storage, &platform, limit, offset).await,
    Command::Range { start, end, filter, limit } => {
      commands::range(storage, start, end, filter.platform.as_ref(), limit).await
    }
    Command::Search { embedding, limit, threshold, filter } => {
      commands::search(storage, &embedding, limit, threshold, filter.platform.as_ref()).await
    }
    Command::Grep { terms, limit, filter } => {
      commands::grep(storage, &terms, limit, filter.platform.as_ref()).await
    }
    Command::Import { file } => commands::import(storage, &file).await,
    Command::Get { id, json } => commands::get(storage, &id, json).await,
    Command::Delete { id, force } => commands::delete(storage, &id, force).await,
    Command::Stats { json } => commands::stats(storage, json).await,
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  bentley::init_subscriber(cli.verbose);

  let config = ChorusConfig::load(cli.config.as_deref())?;
  let storage = CommunityStorage::open(config).await?;

  let result = handle(&storage, cli.command).await;
  storage.shutdown().await;
  result
}
