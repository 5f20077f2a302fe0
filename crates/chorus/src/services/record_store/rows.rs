//! Conversion between SQLite rows and record types

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::errors::StoreError;
use crate::models::{Platform, StoredRecord};

/// Columns selected for every hydrated row
pub const RECORD_COLUMNS: &str =
  "id, platform, content, author, timestamp, source_url, metadata, created_at, updated_at";

/// Fixed-width RFC 3339 in UTC, so text comparison matches time order
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
  timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite's own datetime forms, read as UTC
const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// RFC 3339, or one of the forms `datetime()` and `date()` produce
pub fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
  let value = value.trim();
  if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
    return Ok(timestamp.with_timezone(&Utc));
  }

  NAIVE_TIMESTAMP_FORMATS
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
    .or_else(|| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().and_then(|date| date.and_hms_opt(0, 0, 0)))
    .map(|naive| naive.and_utc())
    .ok_or_else(|| StoreError::query(format!("Invalid {} value '{}'", column, value)))
}

/// Convert a row selected with [`RECORD_COLUMNS`]
pub fn row_to_stored_record(row: &SqliteRow) -> Result<StoredRecord, StoreError> {
  let id = extract_string_column(row, "id")?;
  let metadata = parse_metadata(&id, &extract_string_column(row, "metadata")?);

  Ok(StoredRecord {
    platform: Platform::parse(&extract_string_column(row, "platform")?),
    content: extract_string_column(row, "content")?,
    author: extract_string_column(row, "author")?,
    timestamp: extract_timestamp_column(row, "timestamp")?,
    source_url: extract_string_column(row, "source_url")?,
    metadata,
    created_at: extract_timestamp_column(row, "created_at")?,
    updated_at: extract_timestamp_column(row, "updated_at")?,
    id,
  })
}

/// Rows that cannot be converted are logged and left out
pub fn rows_to_stored_records(rows: &[SqliteRow]) -> Vec<StoredRecord> {
  rows
    .iter()
    .filter_map(|row| match row_to_stored_record(row) {
      Ok(record) => Some(record),
      Err(e) => {
        let id = extract_string_column(row, "id").unwrap_or_default();
        bentley::warn!(&format!("Skipping unreadable record '{}': {}", id, e));
        None
      }
    })
    .collect()
}

fn extract_string_column(row: &SqliteRow, column: &str) -> Result<String, StoreError> {
  row
    .try_get::<Option<String>, _>(column)
    .map(|value| value.unwrap_or_default())
    .map_err(|e| StoreError::query(format!("Failed to read column '{}': {}", column, e)))
}

fn extract_timestamp_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
  parse_timestamp(column, &extract_string_column(row, column)?)
}

/// Metadata written by other tools may not be a JSON object; such rows keep an empty map
fn parse_metadata(id: &str, text: &str) -> Map<String, Value> {
  if text.trim().is_empty() {
    return Map::new();
  }
  match serde_json::from_str::<Value>(text) {
    Ok(Value::Object(map)) => map,
    _ => {
      bentley::warn!(&format!("Record {} has unreadable metadata, returning it empty", id));
      Map::new()
    }
  }
}
