//! Keeps the in-memory index in step with the record store

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;

use super::codec::{self, RawEmbedding};
use super::dimension::Dimension;
use super::index::{l2_normalize, IndexChange, IndexSnapshot};
use super::record_store::SharedRecordStore;
use crate::errors::{EmbeddingIssue, StoreError};

/// Result of a full rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
  pub indexed: usize,
  pub skipped: usize,
  pub generation: u64,
}

/// Result of indexing a single record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
  Appended,
  Replaced,
  Skipped(EmbeddingIssue),
}

/// Decode, check and normalize one embedding for the index
pub fn prepare_vector(raw: Option<&RawEmbedding>, dimension: Dimension) -> Result<Vec<f32>, EmbeddingIssue> {
  let raw = raw.ok_or(EmbeddingIssue::Missing)?;
  let vector = codec::decode(raw).ok_or(EmbeddingIssue::Undecodable)?;
  if vector.len() != dimension.get() {
    return Err(EmbeddingIssue::DimensionMismatch { expected: dimension.get(), actual: vector.len() });
  }
  l2_normalize(&vector).ok_or(EmbeddingIssue::ZeroMagnitude)
}

/// Owner of the live index snapshot.
///
/// Readers clone the current `Arc` and never block writers for longer than the swap.
/// Rebuilds and incremental adds are serialized by `writer`.
pub struct IndexSynchronizer {
  store: SharedRecordStore,
  dimension: Dimension,
  live: RwLock<Arc<IndexSnapshot>>,
  writer: Mutex<()>,
}

impl IndexSynchronizer {
  pub fn new(store: SharedRecordStore, dimension: Dimension) -> Self {
    Self {
      store,
      dimension,
      live: RwLock::new(Arc::new(IndexSnapshot::empty(dimension))),
      writer: Mutex::new(()),
    }
  }

  pub fn dimension(&self) -> Dimension {
    self.dimension
  }

  pub fn snapshot(&self) -> Arc<IndexSnapshot> {
    self.live.read().clone()
  }

  /// Rebuild from every stored embedding and swap the result in
  pub async fn rebuild(&self) -> Result<RebuildReport, StoreError> {
    let _writer = self.writer.lock().await;
    let rows = self.store.embedding_rows().await?;

    let mut entries = Vec::with_capacity(rows.len());
    let mut skipped = 0;
    for row in rows {
      match prepare_vector(Some(&RawEmbedding::Text(row.embedding)), self.dimension) {
        Ok(vector) => entries.push((row.id, vector)),
        Err(issue) => {
          skipped += 1;
          bentley::warn!(&format!("Skipping record {} during rebuild: {}", row.id, issue));
        }
      }
    }

    let generation = self.snapshot().generation() + 1;
    let snapshot = IndexSnapshot::build(self.dimension, entries, generation)?;
    let report = RebuildReport { indexed: snapshot.ntotal(), skipped, generation };

    *self.live.write() = Arc::new(snapshot);

    bentley::info!(&format!(
      "Index rebuilt (generation {}): {} vectors, {} skipped",
      report.generation, report.indexed, report.skipped
    ));
    Ok(report)
  }

  /// Index one freshly written record. Failures are logged and reported, never raised.
  pub async fn incremental_add(&self, id: &str, raw: Option<&RawEmbedding>) -> IndexOutcome {
    let vector = match prepare_vector(raw, self.dimension) {
      Ok(vector) => vector,
      Err(issue) => {
        bentley::warn!(&format!("Record {} not indexed: {}", id, issue));
        return IndexOutcome::Skipped(issue);
      }
    };

    let _writer = self.writer.lock().await;
    // The copy is modified outside the lock; readers keep the current snapshot until the swap
    let mut next = self.snapshot();
    let change = Arc::make_mut(&mut next).upsert(id, vector);
    let total = next.ntotal();
    if change.is_ok() {
      *self.live.write() = next;
    }

    match change {
      Ok(IndexChange::Appended) => {
        bentley::verbose!(&format!("Appended {} to index ({} vectors)", id, total));
        IndexOutcome::Appended
      }
      Ok(IndexChange::Replaced) => {
        bentley::verbose!(&format!("Replaced vector for {} in index", id));
        IndexOutcome::Replaced
      }
      Err(e) => {
        bentley::warn!(&format!("Record {} not indexed: {}", id, e));
        let issue = match e {
          StoreError::DimensionMismatch { expected, actual } => {
            EmbeddingIssue::DimensionMismatch { expected, actual }
          }
          _ => EmbeddingIssue::Undecodable,
        };
        IndexOutcome::Skipped(issue)
      }
    }
  }
}
