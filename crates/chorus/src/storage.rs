//! The storage facade: durable records plus the synchronized similarity index

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ChorusConfig;
use crate::errors::StoreError;
use crate::models::{Platform, Record, ScoredRecord, StoredRecord};
use crate::services::codec;
use crate::services::dimension::{Dimension, DimensionDetector, DimensionSource};
use crate::services::embeddings::{EmbeddingProvider, RemoteEmbeddingProvider};
use crate::services::record_store::{SharedRecordStore, SqliteRecordStore, UpsertOutcome};
use crate::services::search::SimilaritySearchService;
use crate::services::synchronizer::{IndexOutcome, IndexSynchronizer, RebuildReport};
use crate::stats::{OperationCounters, StorageStats};

/// Shape of the in-memory index at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
  /// At least one build has completed
  pub exists: bool,
  pub vector_count: usize,
  pub dimension: Dimension,
  pub generation: u64,
}

pub struct CommunityStorage {
  store: SharedRecordStore,
  synchronizer: Arc<IndexSynchronizer>,
  search: SimilaritySearchService,
  config: ChorusConfig,
  counters: OperationCounters,
  dimension_source: DimensionSource,
}

impl CommunityStorage {
  /// Open the SQLite store named in `config`, detect the dimension and build the index
  pub async fn open(config: ChorusConfig) -> Result<Self, StoreError> {
    let store: SharedRecordStore = Arc::new(SqliteRecordStore::open(&config.database).await?);
    let provider = RemoteEmbeddingProvider::from_config(&config.embeddings)
      .map_err(|e| StoreError::config(e.to_string()))?
      .map(|provider| {
        bentley::verbose!(&format!("Using embedding service at {}", provider.endpoint()));
        Arc::new(provider) as Arc<dyn EmbeddingProvider>
      });

    Self::with_store(store, provider, config).await
  }

  /// Build on an injected store and embedding provider
  pub async fn with_store(
    store: SharedRecordStore,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    config: ChorusConfig,
  ) -> Result<Self, StoreError> {
    let detected = DimensionDetector::new(&*store, provider.as_deref(), &config.index).detect().await;

    let synchronizer = Arc::new(IndexSynchronizer::new(store.clone(), detected.dimension));
    synchronizer.rebuild().await?;

    let search = SimilaritySearchService::new(store.clone(), synchronizer.clone(), config.search.clone());

    Ok(Self {
      store,
      synchronizer,
      search,
      config,
      counters: OperationCounters::default(),
      dimension_source: detected.source,
    })
  }

  pub fn config(&self) -> &ChorusConfig {
    &self.config
  }

  pub fn dimension(&self) -> Dimension {
    self.synchronizer.dimension()
  }

  pub fn dimension_source(&self) -> DimensionSource {
    self.dimension_source
  }

  /// Upsert one record and index its embedding.
  ///
  /// `Ok(false)` for records that fail validation or a record-level query error.
  /// Only an unreachable store is an `Err`. The row is written even when its
  /// embedding cannot be indexed.
  pub async fn insert_record(&self, record: &Record) -> Result<bool, StoreError> {
    if let Err(rejection) = record.validate(&self.config.validation) {
      self.counters.error();
      bentley::warn!(&format!("Rejected record {}: {}", record.id, rejection));
      return Ok(false);
    }

    let embedding_column = record.embedding.as_ref().map(codec::encode_column);
    let outcome = match self.store.upsert(record, embedding_column.as_deref()).await {
      Ok(outcome) => outcome,
      Err(e) if e.is_connectivity() => {
        self.counters.error();
        bentley::error!(&format!("Failed to store record {}: {}", record.id, e));
        return Err(e);
      }
      Err(e) => {
        self.counters.error();
        bentley::warn!(&format!("Failed to store record {}: {}", record.id, e));
        return Ok(false);
      }
    };

    match outcome {
      UpsertOutcome::Inserted => self.counters.record_inserted(),
      UpsertOutcome::Updated => self.counters.record_updated(),
    }

    let indexed = match &record.embedding {
      Some(raw) => matches!(
        self.synchronizer.incremental_add(&record.id, Some(raw)).await,
        IndexOutcome::Appended | IndexOutcome::Replaced
      ),
      None => {
        bentley::verbose!(&format!("Record {} stored without embedding", record.id));
        false
      }
    };

    if !indexed && outcome == UpsertOutcome::Updated && self.synchronizer.snapshot().contains(&record.id) {
      bentley::warn!(&format!("Record {} keeps its previous vector until the next rebuild", record.id));
    }

    Ok(true)
  }

  /// Insert each record independently and return how many succeeded
  pub async fn insert_records_batch(&self, records: &[Record]) -> usize {
    let started = Instant::now();
    let mut stored = 0;

    for record in records {
      match self.insert_record(record).await {
        Ok(true) => stored += 1,
        Ok(false) => {}
        Err(e) => {
          bentley::error!(&format!("Batch insert of {} failed: {}", record.id, e));
        }
      }
    }

    bentley::info!(&format!(
      "Batch insert stored {}/{} records in {:.2}s",
      stored,
      records.len(),
      started.elapsed().as_secs_f64()
    ));
    stored
  }

  pub async fn search_similar_records(
    &self,
    query_embedding: &[f32],
    limit: usize,
    threshold: f32,
    platform: Option<&Platform>,
  ) -> Result<Vec<ScoredRecord>, StoreError> {
    self.counters.search_performed();
    let result = self.search.search(query_embedding, limit, threshold, platform).await;
    self.track(result)
  }

  /// Newest first
  pub async fn get_records_by_platform(
    &self,
    platform: &Platform,
    limit: u32,
    offset: u32,
  ) -> Result<Vec<StoredRecord>, StoreError> {
    let result = self.store.by_platform(platform, limit, offset).await;
    self.track(result)
  }

  /// Inclusive on both ends, newest first
  pub async fn get_records_by_time_range(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    platform: Option<&Platform>,
    limit: u32,
  ) -> Result<Vec<StoredRecord>, StoreError> {
    let result = self.store.by_time_range(start, end, platform, limit).await;
    self.track(result)
  }

  /// Removes the row. Its vector drops out of the index at the next rebuild.
  pub async fn delete_record(&self, id: &str) -> Result<bool, StoreError> {
    let result = self.store.delete(id).await;
    let deleted = self.track(result)?;
    if deleted {
      self.counters.record_deleted();
      bentley::info!(&format!("Deleted record {}", id));
    } else {
      bentley::verbose!(&format!("No record {} to delete", id));
    }
    Ok(deleted)
  }

  pub async fn get_record_count(&self, platform: Option<&Platform>) -> Result<u64, StoreError> {
    let result = self.store.count(platform).await;
    self.track(result)
  }

  pub fn get_index_status(&self) -> IndexStatus {
    let snapshot = self.synchronizer.snapshot();
    IndexStatus {
      exists: snapshot.generation() > 0,
      vector_count: snapshot.ntotal(),
      dimension: snapshot.dimension(),
      generation: snapshot.generation(),
    }
  }

  pub async fn get_record(&self, id: &str) -> Result<Option<StoredRecord>, StoreError> {
    let result = self.store.get(id).await;
    self.track(result)
  }

  /// Records containing every whitespace separated term of `query`, newest first
  pub async fn search_by_content(
    &self,
    query: &str,
    limit: u32,
    platform: Option<&Platform>,
  ) -> Result<Vec<StoredRecord>, StoreError> {
    let terms: Vec<String> = query.split_whitespace().map(str::to_string).collect();
    if terms.is_empty() {
      return Ok(Vec::new());
    }
    self.counters.search_performed();
    let result = self.store.search_content(&terms, limit, platform).await;
    self.track(result)
  }

  pub async fn rebuild_index(&self) -> Result<RebuildReport, StoreError> {
    let result = self.synchronizer.rebuild().await;
    self.track(result)
  }

  pub async fn get_stats(&self) -> Result<StorageStats, StoreError> {
    let platform_counts = self.track(self.store.count_by_platform().await)?;
    Ok(StorageStats {
      counters: self.counters.snapshot(),
      total_records: platform_counts.values().sum(),
      platform_counts,
    })
  }

  /// Close every pooled connection. Later operations fail with a connectivity error.
  pub async fn shutdown(&self) {
    self.store.close().await;
    bentley::info!("Record store connections closed");
  }

  fn track<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
    if let Err(e) = &result {
      self.counters.error();
      bentley::error!(&format!("Storage operation failed: {}", e));
    }
    result
  }
}
