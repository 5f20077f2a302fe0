use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use colored::*;

use crate::cli::display::{display_index_status, display_record, display_scored_record, display_stats};
use crate::models::{Platform, Record};
use crate::services::codec::{self, RawEmbedding};
use crate::storage::CommunityStorage;

pub async fn status(storage: &CommunityStorage) -> Result<()> {
  display_index_status(&storage.get_index_status());
  println!("  records:    {}", storage.get_record_count(None).await?.to_string().bold());
  Ok(())
}

pub async fn rebuild(storage: &CommunityStorage) -> Result<()> {
  println!("{} Rebuilding similarity index...", "🔄".cyan());
  let report = storage.rebuild_index().await?;
  println!(
    "{} Indexed {} vectors ({} skipped), generation {}",
    "✓".green(),
    report.indexed.to_string().bold(),
    report.skipped,
    report.generation
  );
  Ok(())
}

pub async fn count(storage: &CommunityStorage, platform: Option<&Platform>) -> Result<()> {
  let total = storage.get_record_count(platform).await?;
  match platform {
    Some(platform) => println!("{} records on {}", total.to_string().bold(), platform.as_str().blue()),
    None => println!("{} records", total.to_string().bold()),
  }
  Ok(())
}

pub async fn list(storage: &CommunityStorage, platform: &Platform, limit: u32, offset: u32) -> Result<()> {
  let records = storage.get_records_by_platform(platform, limit, offset).await?;
  if records.is_empty() {
    println!("No records found for platform: {}", platform.as_str().yellow());
    return Ok(());
  }

  for record in &records {
    display_record(record, &[]);
  }
  Ok(())
}

pub async fn range(
  storage: &CommunityStorage,
  start: DateTime<Utc>,
  end: DateTime<Utc>,
  platform: Option<&Platform>,
  limit: u32,
) -> Result<()> {
  if start > end {
    return Err(anyhow!("Start {} is after end {}", start, end));
  }

  let records = storage.get_records_by_time_range(start, end, platform, limit).await?;
  if records.is_empty() {
    println!("No records between {} and {}.", start, end);
    return Ok(());
  }

  for record in &records {
    display_record(record, &[]);
  }
  Ok(())
}

pub async fn search(
  storage: &CommunityStorage,
  embedding: &str,
  limit: Option<usize>,
  threshold: Option<f32>,
  platform: Option<&Platform>,
) -> Result<()> {
  let query = codec::decode(&RawEmbedding::Text(embedding.to_string()))
    .ok_or_else(|| anyhow!("Could not parse query embedding '{}'", embedding))?;

  let settings = &storage.config().search;
  let limit = limit.unwrap_or(settings.default_limit);
  let threshold = threshold.unwrap_or(settings.default_threshold);

  let results = storage.search_similar_records(&query, limit, threshold, platform).await?;
  if results.is_empty() {
    println!("No similar records found.");
    return Ok(());
  }

  println!("{} {} similar records", "🔍".cyan(), results.len());
  for result in &results {
    display_scored_record(result);
  }
  Ok(())
}

pub async fn grep(storage: &CommunityStorage, terms: &[String], limit: u32, platform: Option<&Platform>) -> Result<()> {
  let records = storage.search_by_content(&terms.join(" "), limit, platform).await?;
  if records.is_empty() {
    println!("No records matching: {}", terms.join(" ").yellow());
    return Ok(());
  }

  for record in &records {
    display_record(record, terms);
  }
  Ok(())
}

/// Parse one record per line. Blank lines are ignored; unparseable lines are counted.
pub fn parse_jsonl(content: &str) -> (Vec<Record>, usize) {
  let mut records = Vec::new();
  let mut malformed = 0;

  for (number, line) in content.lines().enumerate() {
    if line.trim().is_empty() {
      continue;
    }
    match serde_json::from_str::<Record>(line) {
      Ok(record) => records.push(record),
      Err(e) => {
        malformed += 1;
        bentley::warn!(&format!("Line {} is not a valid record: {}", number + 1, e));
      }
    }
  }

  (records, malformed)
}

pub async fn import(storage: &CommunityStorage, path: &Path) -> Result<()> {
  let content =
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
  let (records, malformed) = parse_jsonl(&content);

  let stored = storage.insert_records_batch(&records).await;
  let total = records.len() + malformed;
  println!("{} Imported {}/{} records", "✓".green(), stored.to_string().bold(), total);
  if stored < total {
    println!("  {} {} records were rejected, see log output", "⚠".yellow(), total - stored);
  }
  Ok(())
}

pub async fn get(storage: &CommunityStorage, id: &str, json: bool) -> Result<()> {
  let record = storage.get_record(id).await?.ok_or_else(|| anyhow!("Record {} not found", id))?;

  if json {
    println!("{}", serde_json::to_string_pretty(&record)?);
  } else {
    display_record(&record, &[]);
  }
  Ok(())
}

pub async fn delete(storage: &CommunityStorage, id: &str, force: bool) -> Result<()> {
  if storage.get_record(id).await?.is_none() {
    return Err(anyhow!("Record {} not found", id));
  }

  if !force {
    print!("Are you sure you want to delete record {}? (y/N): ", id.yellow());
    std::io::Write::flush(&mut std::io::stdout())?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    let response = input.trim().to_lowercase();
    if response != "y" && response != "yes" {
      println!("Delete operation cancelled.");
      return Ok(());
    }
  }

  storage.delete_record(id).await?;
  println!("{} Deleted record {}", "✓".green(), id.yellow());
  Ok(())
}

pub async fn stats(storage: &CommunityStorage, json: bool) -> Result<()> {
  let stats = storage.get_stats().await?;
  if json {
    println!("{}", serde_json::to_string_pretty(&stats)?);
  } else {
    display_stats(&stats);
  }
  Ok(())
}
