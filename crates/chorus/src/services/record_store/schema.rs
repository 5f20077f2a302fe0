use sqlx::SqlitePool;

use crate::errors::StoreError;

pub const RECORDS_TABLE: &str = "records";

const CREATE_RECORDS: &str = "CREATE TABLE IF NOT EXISTS records (
  id TEXT PRIMARY KEY,
  platform TEXT NOT NULL,
  content TEXT NOT NULL,
  author TEXT NOT NULL,
  timestamp TEXT NOT NULL,
  source_url TEXT NOT NULL DEFAULT '',
  metadata TEXT NOT NULL DEFAULT '{}',
  embedding TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
)";

const CREATE_PLATFORM_TIMESTAMP_INDEX: &str =
  "CREATE INDEX IF NOT EXISTS idx_records_platform_timestamp ON records (platform, timestamp)";

const CREATE_TIMESTAMP_INDEX: &str =
  "CREATE INDEX IF NOT EXISTS idx_records_timestamp ON records (timestamp)";

/// Create the records table and its indexes if they are missing
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
  for statement in [CREATE_RECORDS, CREATE_PLATFORM_TIMESTAMP_INDEX, CREATE_TIMESTAMP_INDEX] {
    sqlx::query(statement).execute(pool).await?;
  }
  bentley::verbose!(&format!("Schema ready for table '{}'", RECORDS_TABLE));
  Ok(())
}
