//! Display formatting utilities for CLI output

use colored::*;

use crate::models::{ScoredRecord, StoredRecord};
use crate::stats::StorageStats;
use crate::storage::IndexStatus;

const WRAP_WIDTH: usize = 80;

/// Highlight search terms in text, matching ASCII case-insensitively
pub fn highlight_keywords(text: &str, terms: &[String]) -> String {
  let mut result = text.to_string();

  let mut sorted = terms.to_vec();
  sorted.sort_by_key(|term| std::cmp::Reverse(term.len()));

  for term in sorted {
    if term.is_empty() {
      continue;
    }

    let needle = term.to_ascii_lowercase();
    let haystack = result.to_ascii_lowercase();
    let mut highlighted = String::with_capacity(result.len());
    let mut end = 0;

    for (position, _) in haystack.match_indices(&needle) {
      if position < end {
        continue;
      }
      highlighted.push_str(&result[end..position]);
      highlighted.push_str(&result[position..position + needle.len()].yellow().bold().to_string());
      end = position + needle.len();
    }

    highlighted.push_str(&result[end..]);
    result = highlighted;
  }

  result
}

/// Wrap text to fit within a specified width
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

fn record_header(record: &StoredRecord) -> String {
  format!(
    "=== {} [{}] {} ===",
    record.id.yellow().bold(),
    record.platform.as_str().blue(),
    record.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed()
  )
}

/// Display a record with optional keyword highlighting
pub fn display_record(record: &StoredRecord, terms: &[String]) {
  println!("{}", record_header(record));
  println!("{} {}", "author:".dimmed(), record.author);
  if !record.source_url.is_empty() {
    println!("{} {}", "source:".dimmed(), record.source_url.cyan());
  }

  for line in wrap_text(&record.content, WRAP_WIDTH) {
    println!("{}", highlight_keywords(&line, terms));
  }
  println!();
}

pub fn display_scored_record(result: &ScoredRecord) {
  println!("{} {}", format!("{:.3}", result.similarity).green().bold(), record_header(&result.record));
  for line in wrap_text(&result.record.content, WRAP_WIDTH) {
    println!("{line}");
  }
  println!();
}

pub fn display_index_status(status: &IndexStatus) {
  let state = if status.exists { "built".green() } else { "not built".yellow() };
  println!("{} Index {}", "📊".cyan(), state);
  println!("  vectors:    {}", status.vector_count.to_string().bold());
  println!("  dimension:  {}", status.dimension.to_string().bold());
  println!("  generation: {}", status.generation.to_string().bold());
}

pub fn display_stats(stats: &StorageStats) {
  println!("{} Storage statistics", "📊".cyan());
  println!("  total records:      {}", stats.total_records.to_string().bold());
  for (platform, count) in &stats.platform_counts {
    println!("    {:<18} {}", platform.blue(), count);
  }
  println!("  records inserted:   {}", stats.counters.records_inserted);
  println!("  records updated:    {}", stats.counters.records_updated);
  println!("  records deleted:    {}", stats.counters.records_deleted);
  println!("  searches performed: {}", stats.counters.searches_performed);
  println!("  errors:             {}", stats.counters.errors);
}
