use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chorus::services::dimension::DimensionSource;
use chorus::services::embeddings::EmbeddingProvider;
use chorus::services::record_store::{SharedRecordStore, SqliteRecordStore};
use chorus::{ChorusConfig, CommunityStorage, Platform, RawEmbedding, Record, StoreError};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

struct MockEmbeddingProvider {
  dimension: usize,
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
  async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
    Ok(vec![0.1; self.dimension])
  }
}

struct FailingEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
  async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
    Err(anyhow!("embedding service offline"))
  }
}

fn test_config(temp: &TempDir) -> ChorusConfig {
  let mut config = ChorusConfig::default();
  config.database.url = format!("sqlite://{}", temp.path().join("records.db").display());
  config.database.max_connections = 4;
  config.index.fallback_dimension = 3;
  config
}

async fn open_storage(temp: &TempDir) -> CommunityStorage {
  CommunityStorage::open(test_config(temp)).await.unwrap()
}

fn at(minutes: i64) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn record(id: &str, platform: Platform, embedding: Option<Vec<f32>>) -> Record {
  let mut record = Record::new(id, platform, format!("content of {id}"), "user_1", at(0));
  record.embedding = embedding.map(RawEmbedding::Array);
  record
}

#[tokio::test]
async fn test_open_builds_empty_index() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;

  let status = storage.get_index_status();
  assert!(status.exists);
  assert_eq!(status.vector_count, 0);
  assert_eq!(status.dimension.get(), 3);
  assert_eq!(status.generation, 1);
  assert_eq!(storage.dimension_source(), DimensionSource::Fallback);
}

#[tokio::test]
async fn test_count_tracks_new_ids_only() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;

  assert!(storage.insert_record(&record("a", Platform::Slack, Some(vec![1.0, 0.0, 0.0]))).await.unwrap());
  assert_eq!(storage.get_record_count(None).await.unwrap(), 1);

  assert!(storage.insert_record(&record("a", Platform::Slack, Some(vec![1.0, 0.0, 0.0]))).await.unwrap());
  assert_eq!(storage.get_record_count(None).await.unwrap(), 1);

  let stats = storage.get_stats().await.unwrap();
  assert_eq!(stats.counters.records_inserted, 1);
  assert_eq!(stats.counters.records_updated, 1);
}

#[tokio::test]
async fn test_inserted_record_is_searchable_without_rebuild() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  let generation = storage.get_index_status().generation;

  storage.insert_record(&record("a", Platform::Github, Some(vec![0.2, 0.4, 0.9]))).await.unwrap();

  let results = storage.search_similar_records(&[0.2, 0.4, 0.9], 1, 0.0, None).await.unwrap();
  assert_eq!(results.len(), 1);
  assert_eq!(results[0].record.id, "a");
  assert!((results[0].similarity - 1.0).abs() < 1e-5);
  assert_eq!(storage.get_index_status().generation, generation);
}

#[tokio::test]
async fn test_self_search_after_rebuild() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  let vectors = [vec![1.0, 2.0, 3.0], vec![-1.0, 0.5, 0.0], vec![0.0, 0.0, 4.0]];
  for (i, vector) in vectors.iter().enumerate() {
    storage.insert_record(&record(&format!("r{i}"), Platform::Slack, Some(vector.clone()))).await.unwrap();
  }

  let report = storage.rebuild_index().await.unwrap();
  assert_eq!(report.indexed, 3);
  assert_eq!(report.skipped, 0);

  for (i, vector) in vectors.iter().enumerate() {
    let results = storage.search_similar_records(vector, 1, 0.0, None).await.unwrap();
    assert_eq!(results[0].record.id, format!("r{i}"));
    assert!((results[0].similarity - 1.0).abs() < 1e-5);
  }
}

#[tokio::test]
async fn test_scenario_platform_filter() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  storage.insert_record(&record("doc_1", Platform::Github, Some(vec![1.0, 0.0, 0.0]))).await.unwrap();
  storage.insert_record(&record("doc_2", Platform::Slack, Some(vec![0.0, 1.0, 0.0]))).await.unwrap();

  let results = storage.search_similar_records(&[1.0, 0.0, 0.0], 1, 0.5, None).await.unwrap();
  assert_eq!(results.len(), 1);
  assert_eq!(results[0].record.id, "doc_1");
  assert!((results[0].similarity - 1.0).abs() < 1e-5);

  let slack_only =
    storage.search_similar_records(&[1.0, 0.0, 0.0], 1, 0.5, Some(&Platform::Slack)).await.unwrap();
  assert!(slack_only.is_empty());
}

#[tokio::test]
async fn test_platform_filter_never_leaks() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  for i in 0..6 {
    let platform = if i % 2 == 0 { Platform::Slack } else { Platform::Github };
    storage.insert_record(&record(&format!("r{i}"), platform, Some(vec![1.0, i as f32 * 0.1, 0.0]))).await.unwrap();
  }

  let results =
    storage.search_similar_records(&[1.0, 0.0, 0.0], 10, 0.0, Some(&Platform::Github)).await.unwrap();
  assert_eq!(results.len(), 3);
  assert!(results.iter().all(|result| result.record.platform == Platform::Github));
}

#[tokio::test]
async fn test_adaptive_threshold_returns_best_match() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  storage.insert_record(&record("a", Platform::Slack, Some(vec![1.0, 0.0, 0.0]))).await.unwrap();

  // cosine 0.6 is below 0.7, relaxed threshold is 0.48
  let results = storage.search_similar_records(&[0.6, 0.8, 0.0], 5, 0.7, None).await.unwrap();
  assert_eq!(results.len(), 1);
  assert!((results[0].similarity - 0.6).abs() < 1e-5);
}

#[tokio::test]
async fn test_results_sorted_and_truncated() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  storage.insert_record(&record("far", Platform::Slack, Some(vec![0.5, 0.5, 0.0]))).await.unwrap();
  storage.insert_record(&record("near", Platform::Slack, Some(vec![1.0, 0.1, 0.0]))).await.unwrap();
  storage.insert_record(&record("exact", Platform::Slack, Some(vec![1.0, 0.0, 0.0]))).await.unwrap();

  let results = storage.search_similar_records(&[1.0, 0.0, 0.0], 2, 0.0, None).await.unwrap();
  let ids: Vec<&str> = results.iter().map(|result| result.record.id.as_str()).collect();
  assert_eq!(ids, vec!["exact", "near"]);
}

#[tokio::test]
async fn test_delete_then_rebuild_excludes_record() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  storage.insert_record(&record("a", Platform::Slack, Some(vec![1.0, 0.0, 0.0]))).await.unwrap();
  storage.insert_record(&record("b", Platform::Slack, Some(vec![0.9, 0.1, 0.0]))).await.unwrap();

  assert!(storage.delete_record("a").await.unwrap());
  assert!(!storage.delete_record("a").await.unwrap());
  assert_eq!(storage.get_record_count(None).await.unwrap(), 1);

  // Stale vector is still indexed but can no longer be hydrated
  let before = storage.search_similar_records(&[1.0, 0.0, 0.0], 5, 0.0, None).await.unwrap();
  assert!(before.iter().all(|result| result.record.id != "a"));

  let report = storage.rebuild_index().await.unwrap();
  assert_eq!(report.indexed, 1);
  let after = storage.search_similar_records(&[1.0, 0.0, 0.0], 5, 0.0, None).await.unwrap();
  assert_eq!(after.len(), 1);
  assert_eq!(after[0].record.id, "b");
}

#[tokio::test]
async fn test_malformed_embedding_is_persisted_but_not_indexed() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  let mut bad = record("bad", Platform::Slack, None);
  bad.embedding = Some(RawEmbedding::Text("1.0, banana, 3.0".to_string()));

  assert!(storage.insert_record(&bad).await.unwrap());
  assert!(storage.get_record("bad").await.unwrap().is_some());
  assert_eq!(storage.get_index_status().vector_count, 0);

  let report = storage.rebuild_index().await.unwrap();
  assert_eq!(report.indexed, 0);
  assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_wrong_dimension_embedding_is_skipped() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;

  assert!(storage.insert_record(&record("wide", Platform::Slack, Some(vec![1.0, 0.0, 0.0, 0.0]))).await.unwrap());
  assert_eq!(storage.get_record_count(None).await.unwrap(), 1);
  assert_eq!(storage.get_index_status().vector_count, 0);
}

#[tokio::test]
async fn test_record_without_embedding_is_retrievable() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  storage.insert_record(&record("plain", Platform::Facebook, None)).await.unwrap();

  assert_eq!(storage.get_index_status().vector_count, 0);
  let listed = storage.get_records_by_platform(&Platform::Facebook, 10, 0).await.unwrap();
  assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_reinsert_replaces_vector() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  storage.insert_record(&record("a", Platform::Slack, Some(vec![1.0, 0.0, 0.0]))).await.unwrap();
  storage.insert_record(&record("a", Platform::Slack, Some(vec![0.0, 1.0, 0.0]))).await.unwrap();

  assert_eq!(storage.get_index_status().vector_count, 1);
  let results = storage.search_similar_records(&[0.0, 1.0, 0.0], 1, 0.9, None).await.unwrap();
  assert_eq!(results.len(), 1);
  assert!((results[0].similarity - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_invalid_records_are_rejected() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  let mut invalid = record("x", Platform::Slack, None);
  invalid.content = String::new();

  assert!(!storage.insert_record(&invalid).await.unwrap());
  assert_eq!(storage.get_record_count(None).await.unwrap(), 0);
  assert_eq!(storage.get_stats().await.unwrap().counters.errors, 1);
}

#[tokio::test]
async fn test_batch_insert_counts_successes() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  let mut invalid = record("bad", Platform::Slack, None);
  invalid.author = String::new();
  let records = vec![
    record("a", Platform::Slack, Some(vec![1.0, 0.0, 0.0])),
    invalid,
    record("b", Platform::Github, Some(vec![0.0, 1.0, 0.0])),
  ];

  assert_eq!(storage.insert_records_batch(&records).await, 2);
  assert_eq!(storage.get_record_count(None).await.unwrap(), 2);
}

#[tokio::test]
async fn test_records_by_platform_newest_first_with_offset() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  for i in 0..4 {
    let mut item = record(&format!("s{i}"), Platform::Slack, None);
    item.timestamp = at(i);
    storage.insert_record(&item).await.unwrap();
  }
  storage.insert_record(&record("g0", Platform::Github, None)).await.unwrap();

  let page = storage.get_records_by_platform(&Platform::Slack, 2, 1).await.unwrap();
  let ids: Vec<&str> = page.iter().map(|r| r.id.as_str()).collect();
  assert_eq!(ids, vec!["s2", "s1"]);
}

#[tokio::test]
async fn test_time_range_is_inclusive() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  for i in 0..5 {
    let platform = if i == 3 { Platform::Github } else { Platform::Slack };
    let mut item = record(&format!("r{i}"), platform, None);
    item.timestamp = at(i * 10);
    storage.insert_record(&item).await.unwrap();
  }

  let all = storage.get_records_by_time_range(at(10), at(30), None, 100).await.unwrap();
  let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
  assert_eq!(ids, vec!["r3", "r2", "r1"]);

  let slack = storage.get_records_by_time_range(at(10), at(30), Some(&Platform::Slack), 100).await.unwrap();
  assert_eq!(slack.len(), 2);
}

#[tokio::test]
async fn test_search_by_content_matches_all_terms() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  let mut deploy = record("a", Platform::Slack, None);
  deploy.content = "The Deploy script failed on staging".to_string();
  let mut other = record("b", Platform::Slack, None);
  other.content = "deploy went fine".to_string();
  storage.insert_record(&deploy).await.unwrap();
  storage.insert_record(&other).await.unwrap();

  let results = storage.search_by_content("deploy STAGING", 10, None).await.unwrap();
  assert_eq!(results.len(), 1);
  assert_eq!(results[0].id, "a");

  assert!(storage.search_by_content("   ", 10, None).await.unwrap().is_empty());
  assert!(storage.search_by_content("100%", 10, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_record_round_trips_fields() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  let item = record("a", Platform::GoogleCalendar, None)
    .with_source_url("https://calendar.example/e/1")
    .with_metadata("attendees", json!(3));
  storage.insert_record(&item).await.unwrap();

  let stored = storage.get_record("a").await.unwrap().unwrap();
  assert_eq!(stored.platform, Platform::GoogleCalendar);
  assert_eq!(stored.timestamp, item.timestamp);
  assert_eq!(stored.source_url, "https://calendar.example/e/1");
  assert_eq!(stored.metadata.get("attendees"), Some(&json!(3)));
  assert!(storage.get_record("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_search_edge_cases() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;

  // Empty store: rebuild happens, still nothing to return
  assert!(storage.search_similar_records(&[1.0, 0.0, 0.0], 5, 0.5, None).await.unwrap().is_empty());

  storage.insert_record(&record("a", Platform::Slack, Some(vec![1.0, 0.0, 0.0]))).await.unwrap();
  assert!(storage.search_similar_records(&[1.0, 0.0, 0.0], 0, 0.5, None).await.unwrap().is_empty());
  assert!(storage.search_similar_records(&[0.0, 0.0, 0.0], 5, 0.5, None).await.unwrap().is_empty());

  let mismatch = storage.search_similar_records(&[1.0, 0.0], 5, 0.5, None).await;
  assert!(matches!(mismatch, Err(StoreError::DimensionMismatch { expected: 3, actual: 2 })));
}

#[tokio::test]
async fn test_rows_written_by_other_tools_do_not_break_reads() {
  let temp = TempDir::new().unwrap();
  let config = test_config(&temp);
  let sqlite = Arc::new(SqliteRecordStore::open(&config.database).await.unwrap());
  let storage = CommunityStorage::with_store(sqlite.clone() as SharedRecordStore, None, config).await.unwrap();

  storage.insert_record(&record("good", Platform::Slack, Some(vec![1.0, 0.0, 0.0]))).await.unwrap();
  storage.insert_record(&record("sqlite_form", Platform::Slack, Some(vec![0.9, 0.1, 0.0]))).await.unwrap();
  storage.insert_record(&record("garbled", Platform::Slack, Some(vec![0.8, 0.2, 0.0]))).await.unwrap();

  sqlx::query("UPDATE records SET timestamp = '2024-01-01 10:00:00' WHERE id = 'sqlite_form'")
    .execute(sqlite.pool())
    .await
    .unwrap();
  sqlx::query("UPDATE records SET timestamp = 'last tuesday' WHERE id = 'garbled'")
    .execute(sqlite.pool())
    .await
    .unwrap();

  let results = storage.search_similar_records(&[1.0, 0.0, 0.0], 5, 0.0, None).await.unwrap();
  let ids: Vec<&str> = results.iter().map(|result| result.record.id.as_str()).collect();
  assert_eq!(ids, vec!["good", "sqlite_form"]);
  assert_eq!(results[1].record.timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());

  let listed = storage.get_records_by_platform(&Platform::Slack, 10, 0).await.unwrap();
  assert_eq!(listed.len(), 2);
  assert!(listed.iter().all(|record| record.id != "garbled"));
}

#[tokio::test]
async fn test_stats_report_platform_counts() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  storage.insert_record(&record("a", Platform::Slack, None)).await.unwrap();
  storage.insert_record(&record("b", Platform::Slack, None)).await.unwrap();
  storage.insert_record(&record("c", Platform::Github, None)).await.unwrap();
  storage.delete_record("c").await.unwrap();
  storage.search_similar_records(&[1.0, 0.0, 0.0], 1, 0.5, None).await.unwrap();

  let stats = storage.get_stats().await.unwrap();
  assert_eq!(stats.total_records, 2);
  assert_eq!(stats.platform_counts.get("slack"), Some(&2));
  assert_eq!(stats.platform_counts.get("github"), None);
  assert_eq!(stats.counters.records_inserted, 3);
  assert_eq!(stats.counters.records_deleted, 1);
  assert_eq!(stats.counters.searches_performed, 1);
}

#[tokio::test]
async fn test_reopen_detects_dimension_from_stored_data() {
  let temp = TempDir::new().unwrap();
  {
    let storage = open_storage(&temp).await;
    storage.insert_record(&record("a", Platform::Slack, Some(vec![1.0, 0.0, 0.0]))).await.unwrap();
    storage.shutdown().await;
  }

  let mut config = test_config(&temp);
  config.index.fallback_dimension = 768;
  let storage = CommunityStorage::open(config).await.unwrap();

  assert_eq!(storage.dimension_source(), DimensionSource::StoredEmbedding);
  assert_eq!(storage.get_index_status().dimension.get(), 3);
  assert_eq!(storage.get_index_status().vector_count, 1);
}

#[tokio::test]
async fn test_probe_used_for_empty_store() {
  let temp = TempDir::new().unwrap();
  let config = test_config(&temp);
  let store: SharedRecordStore = Arc::new(SqliteRecordStore::open(&config.database).await.unwrap());
  let provider: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider { dimension: 5 });

  let storage = CommunityStorage::with_store(store, Some(provider), config).await.unwrap();
  assert_eq!(storage.dimension_source(), DimensionSource::Probe);
  assert_eq!(storage.dimension().get(), 5);
}

#[tokio::test]
async fn test_failing_probe_falls_back() {
  let temp = TempDir::new().unwrap();
  let config = test_config(&temp);
  let store: SharedRecordStore = Arc::new(SqliteRecordStore::open(&config.database).await.unwrap());
  let provider: Arc<dyn EmbeddingProvider> = Arc::new(FailingEmbeddingProvider);

  let storage = CommunityStorage::with_store(store, Some(provider), config).await.unwrap();
  assert_eq!(storage.dimension_source(), DimensionSource::Fallback);
  assert_eq!(storage.dimension().get(), 3);
}

#[tokio::test]
async fn test_shutdown_surfaces_connectivity_errors() {
  let temp = TempDir::new().unwrap();
  let storage = open_storage(&temp).await;
  storage.shutdown().await;

  let count = storage.get_record_count(None).await;
  assert!(matches!(count, Err(ref e) if e.is_connectivity()));

  let insert = storage.insert_record(&record("a", Platform::Slack, None)).await;
  assert!(matches!(insert, Err(ref e) if e.is_connectivity()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_and_rebuilds() {
  let temp = TempDir::new().unwrap();
  let storage = Arc::new(open_storage(&temp).await);

  let mut handles = Vec::new();
  for worker in 0..4 {
    let storage = storage.clone();
    handles.push(tokio::spawn(async move {
      for i in 0..10 {
        let id = format!("w{worker}_{i}");
        let vector = vec![1.0, worker as f32, i as f32];
        storage.insert_record(&record(&id, Platform::Slack, Some(vector))).await.unwrap();
      }
    }));
  }

  let rebuilder = {
    let storage = storage.clone();
    tokio::spawn(async move {
      for _ in 0..3 {
        storage.rebuild_index().await.unwrap();
      }
    })
  };

  for handle in handles {
    handle.await.unwrap();
  }
  rebuilder.await.unwrap();

  assert_eq!(storage.get_record_count(None).await.unwrap(), 40);
  assert_eq!(storage.get_index_status().vector_count, 40);

  let report = storage.rebuild_index().await.unwrap();
  assert_eq!(report.indexed, 40);
}
