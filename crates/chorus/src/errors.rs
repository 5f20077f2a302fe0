//! Error types for the record store and the similarity index

use thiserror::Error;

/// Failures surfaced by the record store, the index primitives and the storage facade
#[derive(Error, Debug)]
pub enum StoreError {
  #[error("Record store unavailable: {message}")]
  Connectivity { message: String },

  #[error("Record store query failed: {message}")]
  Query { message: String },

  #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("Invalid store configuration: {message}")]
  Config { message: String },
}

impl StoreError {
  pub fn connectivity(message: impl Into<String>) -> Self {
    Self::Connectivity { message: message.into() }
  }

  pub fn query(message: impl Into<String>) -> Self {
    Self::Query { message: message.into() }
  }

  pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
    Self::DimensionMismatch { expected, actual }
  }

  pub fn config(message: impl Into<String>) -> Self {
    Self::Config { message: message.into() }
  }

  /// True when the store itself could not be reached, as opposed to a single bad statement
  pub fn is_connectivity(&self) -> bool {
    matches!(self, Self::Connectivity { .. })
  }
}

// SQLite primary result codes that mean the database could not be used at all
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;
const SQLITE_CANTOPEN: i64 = 14;

impl From<sqlx::Error> for StoreError {
  fn from(error: sqlx::Error) -> Self {
    match &error {
      sqlx::Error::PoolTimedOut
      | sqlx::Error::PoolClosed
      | sqlx::Error::WorkerCrashed
      | sqlx::Error::Io(_)
      | sqlx::Error::Tls(_) => Self::connectivity(error.to_string()),
      sqlx::Error::Configuration(_) => Self::config(error.to_string()),
      sqlx::Error::Database(db_error) if is_unavailable_code(db_error.code().as_deref()) => {
        Self::connectivity(error.to_string())
      }
      _ => Self::query(error.to_string()),
    }
  }
}

/// Extended SQLite codes carry the primary code in their low byte
fn is_unavailable_code(code: Option<&str>) -> bool {
  code
    .and_then(|code| code.parse::<i64>().ok())
    .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED | SQLITE_CANTOPEN))
    .unwrap_or(false)
}

/// Why an embedding was left out of the index. Never fatal to the surrounding operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingIssue {
  #[error("record has no embedding")]
  Missing,

  #[error("embedding payload could not be decoded")]
  Undecodable,

  #[error("embedding has zero magnitude")]
  ZeroMagnitude,

  #[error("embedding has {actual} dimensions, index expects {expected}")]
  DimensionMismatch { expected: usize, actual: usize },
}

/// Why a record was refused before reaching the store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordRejection {
  #[error("required field '{field}' is empty")]
  MissingField { field: &'static str },

  #[error("content is {length} characters, limit is {max}")]
  ContentTooLong { length: usize, max: usize },

  #[error("metadata is {size} bytes, limit is {max}")]
  MetadataTooLarge { size: usize, max: usize },
}
