//! Connection pool management for the SQLite record store

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::DatabaseConfig;
use crate::errors::StoreError;

const IN_MEMORY: &str = ":memory:";

/// Create the bounded pool, creating the database directory if needed
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, StoreError> {
  let mut options = SqliteConnectOptions::from_str(&config.url)?
    .create_if_missing(true)
    .busy_timeout(Duration::from_secs(config.statement_timeout_secs));

  if let Some(filename) = database_path(&config.url) {
    ensure_parent_directory_exists(&filename)?;
    options = options.journal_mode(SqliteJournalMode::Wal);
  }

  bentley::verbose!(&format!(
    "Opening record store {} (max {} connections)",
    config.url, config.max_connections
  ));

  let pool = SqlitePoolOptions::new()
    .max_connections(config.max_connections)
    .min_connections(config.min_connections)
    .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
    .connect_with(options)
    .await?;

  Ok(pool)
}

/// File behind a `sqlite:` URL, `None` for in-memory databases
fn database_path(url: &str) -> Option<PathBuf> {
  let rest = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:")).unwrap_or(url);
  let path = rest.split('?').next().unwrap_or_default();
  if path.is_empty() || path == IN_MEMORY || rest.contains("mode=memory") {
    return None;
  }
  Some(PathBuf::from(path))
}

fn ensure_parent_directory_exists(filename: &Path) -> Result<(), StoreError> {
  match filename.parent() {
    Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
      std::fs::create_dir_all(parent).map_err(|e| {
        StoreError::connectivity(format!("Failed to create data directory {}: {}", parent.display(), e))
      })
    }
    _ => Ok(()),
  }
}
