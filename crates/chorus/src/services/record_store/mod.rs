pub mod connection;
pub mod rows;
pub mod schema;
pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::StoreError;
use crate::models::{Platform, Record, StoredRecord};

pub use sqlite::SqliteRecordStore;

/// Whether an upsert created a new row or overwrote an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
  Inserted,
  Updated,
}

/// The raw embedding column of one row
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRow {
  pub id: String,
  pub embedding: String,
}

/// Durable source of truth for records
#[async_trait]
pub trait RecordStore: Send + Sync {
  /// Insert or overwrite the row for `record.id`. `embedding` is the column text.
  async fn upsert(&self, record: &Record, embedding: Option<&str>) -> Result<UpsertOutcome, StoreError>;

  async fn get(&self, id: &str) -> Result<Option<StoredRecord>, StoreError>;

  /// Rows for the given ids in one lookup, restricted to `platform` when set. Order unspecified.
  async fn fetch_many(&self, ids: &[String], platform: Option<&Platform>) -> Result<Vec<StoredRecord>, StoreError>;

  /// Any one non-empty embedding column
  async fn sample_embedding(&self) -> Result<Option<String>, StoreError>;

  /// Every non-empty embedding column, ordered by id
  async fn embedding_rows(&self) -> Result<Vec<EmbeddingRow>, StoreError>;

  async fn by_platform(&self, platform: &Platform, limit: u32, offset: u32) -> Result<Vec<StoredRecord>, StoreError>;

  async fn by_time_range(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    platform: Option<&Platform>,
    limit: u32,
  ) -> Result<Vec<StoredRecord>, StoreError>;

  /// Rows whose content contains every term, case-insensitively, newest first
  async fn search_content(
    &self,
    terms: &[String],
    limit: u32,
    platform: Option<&Platform>,
  ) -> Result<Vec<StoredRecord>, StoreError>;

  async fn delete(&self, id: &str) -> Result<bool, StoreError>;

  async fn count(&self, platform: Option<&Platform>) -> Result<u64, StoreError>;

  async fn count_by_platform(&self) -> Result<BTreeMap<String, u64>, StoreError>;

  async fn close(&self);
}

pub type SharedRecordStore = std::sync::Arc<dyn RecordStore>;
