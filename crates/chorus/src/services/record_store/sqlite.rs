use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::connection::create_pool;
use super::rows::{format_timestamp, row_to_stored_record, rows_to_stored_records, RECORD_COLUMNS};
use super::schema::ensure_schema;
use super::{EmbeddingRow, RecordStore, UpsertOutcome};
use crate::config::DatabaseConfig;
use crate::errors::StoreError;
use crate::models::{Platform, Record, StoredRecord};

/// Upper bound on bound parameters per `IN (...)` lookup
const MAX_IDS_PER_LOOKUP: usize = 500;

/// Record store backed by a SQLite connection pool
pub struct SqliteRecordStore {
  pool: SqlitePool,
}

impl SqliteRecordStore {
  /// Build the pool and make sure the schema exists
  pub async fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
    let pool = create_pool(config).await?;
    ensure_schema(&pool).await?;
    Ok(Self { pool })
  }

  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
  async fn upsert(&self, record: &Record, embedding: Option<&str>) -> Result<UpsertOutcome, StoreError> {
    let now = Utc::now();
    let metadata = record.metadata_json();
    // UPDATE first so the transaction starts as a writer
    let mut tx = self.pool.begin().await?;

    let updated = sqlx::query(
      "UPDATE records SET platform = ?, content = ?, author = ?, timestamp = ?, source_url = ?, \
       metadata = ?, embedding = ?, updated_at = ? WHERE id = ?",
    )
    .bind(record.platform.as_str())
    .bind(&record.content)
    .bind(&record.author)
    .bind(format_timestamp(&record.timestamp))
    .bind(&record.source_url)
    .bind(&metadata)
    .bind(embedding)
    .bind(format_timestamp(&record.updated_at.unwrap_or(now)))
    .bind(&record.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let outcome = if updated > 0 {
      UpsertOutcome::Updated
    } else {
      sqlx::query(
        "INSERT INTO records (id, platform, content, author, timestamp, source_url, metadata, \
         embedding, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
      )
      .bind(&record.id)
      .bind(record.platform.as_str())
      .bind(&record.content)
      .bind(&record.author)
      .bind(format_timestamp(&record.timestamp))
      .bind(&record.source_url)
      .bind(&metadata)
      .bind(embedding)
      .bind(format_timestamp(&record.created_at.unwrap_or(now)))
      .bind(format_timestamp(&record.updated_at.unwrap_or(now)))
      .execute(&mut *tx)
      .await?;
      UpsertOutcome::Inserted
    };

    tx.commit().await?;
    Ok(outcome)
  }

  async fn get(&self, id: &str) -> Result<Option<StoredRecord>, StoreError> {
    let row = sqlx::query(&format!("SELECT {} FROM records WHERE id = ?", RECORD_COLUMNS))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    row.as_ref().map(row_to_stored_record).transpose()
  }

  async fn fetch_many(&self, ids: &[String], platform: Option<&Platform>) -> Result<Vec<StoredRecord>, StoreError> {
    let mut records = Vec::with_capacity(ids.len());

    for chunk in ids.chunks(MAX_IDS_PER_LOOKUP) {
      let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM records WHERE id IN (", RECORD_COLUMNS));
      let mut separated = builder.separated(", ");
      for id in chunk {
        separated.push_bind(id.clone());
      }
      separated.push_unseparated(")");
      push_platform_filter(&mut builder, platform);

      let rows = builder.build().fetch_all(&self.pool).await?;
      records.extend(rows_to_stored_records(&rows));
    }

    Ok(records)
  }

  async fn sample_embedding(&self) -> Result<Option<String>, StoreError> {
    let embedding = sqlx::query_scalar(
      "SELECT embedding FROM records WHERE embedding IS NOT NULL AND TRIM(embedding) != '' LIMIT 1",
    )
    .fetch_optional(&self.pool)
    .await?;
    Ok(embedding)
  }

  async fn embedding_rows(&self) -> Result<Vec<EmbeddingRow>, StoreError> {
    let rows = sqlx::query(
      "SELECT id, embedding FROM records WHERE embedding IS NOT NULL AND TRIM(embedding) != '' ORDER BY id",
    )
    .fetch_all(&self.pool)
    .await?;

    rows
      .iter()
      .map(|row| -> Result<EmbeddingRow, sqlx::Error> {
        Ok(EmbeddingRow { id: row.try_get("id")?, embedding: row.try_get("embedding")? })
      })
      .collect::<Result<Vec<_>, _>>()
      .map_err(StoreError::from)
  }

  async fn by_platform(&self, platform: &Platform, limit: u32, offset: u32) -> Result<Vec<StoredRecord>, StoreError> {
    let rows = sqlx::query(&format!(
      "SELECT {} FROM records WHERE platform = ? ORDER BY timestamp DESC LIMIT ? OFFSET ?",
      RECORD_COLUMNS
    ))
    .bind(platform.as_str())
    .bind(i64::from(limit))
    .bind(i64::from(offset))
    .fetch_all(&self.pool)
    .await?;
    Ok(rows_to_stored_records(&rows))
  }

  async fn by_time_range(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    platform: Option<&Platform>,
    limit: u32,
  ) -> Result<Vec<StoredRecord>, StoreError> {
    let mut builder: QueryBuilder<Sqlite> =
      QueryBuilder::new(format!("SELECT {} FROM records WHERE timestamp BETWEEN ", RECORD_COLUMNS));
    builder.push_bind(format_timestamp(&start)).push(" AND ").push_bind(format_timestamp(&end));
    push_platform_filter(&mut builder, platform);
    builder.push(" ORDER BY timestamp DESC LIMIT ").push_bind(i64::from(limit));

    let rows = builder.build().fetch_all(&self.pool).await?;
    Ok(rows_to_stored_records(&rows))
  }

  async fn search_content(
    &self,
    terms: &[String],
    limit: u32,
    platform: Option<&Platform>,
  ) -> Result<Vec<StoredRecord>, StoreError> {
    if terms.is_empty() {
      return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
      QueryBuilder::new(format!("SELECT {} FROM records WHERE 1 = 1", RECORD_COLUMNS));
    for term in terms {
      builder.push(" AND content LIKE ").push_bind(like_pattern(term)).push(" ESCAPE '\\'");
    }
    push_platform_filter(&mut builder, platform);
    builder.push(" ORDER BY timestamp DESC LIMIT ").push_bind(i64::from(limit));

    let rows = builder.build().fetch_all(&self.pool).await?;
    Ok(rows_to_stored_records(&rows))
  }

  async fn delete(&self, id: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM records WHERE id = ?").bind(id).execute(&self.pool).await?;
    Ok(result.rows_affected() > 0)
  }

  async fn count(&self, platform: Option<&Platform>) -> Result<u64, StoreError> {
    let total: i64 = match platform {
      Some(platform) => {
        sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE platform = ?")
          .bind(platform.as_str())
          .fetch_one(&self.pool)
          .await?
      }
      None => sqlx::query_scalar("SELECT COUNT(*) FROM records").fetch_one(&self.pool).await?,
    };
    Ok(total.max(0) as u64)
  }

  async fn count_by_platform(&self) -> Result<BTreeMap<String, u64>, StoreError> {
    let rows = sqlx::query("SELECT platform, COUNT(*) AS total FROM records GROUP BY platform")
      .fetch_all(&self.pool)
      .await?;

    let mut counts = BTreeMap::new();
    for row in &rows {
      let platform: String = row.try_get("platform")?;
      let total: i64 = row.try_get("total")?;
      counts.insert(platform, total.max(0) as u64);
    }
    Ok(counts)
  }

  async fn close(&self) {
    self.pool.close().await;
  }
}

fn push_platform_filter(builder: &mut QueryBuilder<Sqlite>, platform: Option<&Platform>) {
  if let Some(platform) = platform {
    builder.push(" AND platform = ").push_bind(platform.as_str().to_string());
  }
}

/// `%term%` with LIKE wildcards in the term escaped
fn like_pattern(term: &str) -> String {
  let mut pattern = String::with_capacity(term.len() + 2);
  pattern.push('%');
  for c in term.chars() {
    if matches!(c, '%' | '_' | '\\') {
      pattern.push('\\');
    }
    pattern.push(c);
  }
  pattern.push('%');
  pattern
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_like_pattern_escapes_wildcards() {
    assert_eq!(like_pattern("deploy"), "%deploy%");
    assert_eq!(like_pattern("100%_done"), "%100\\%\\_done%");
  }
}
