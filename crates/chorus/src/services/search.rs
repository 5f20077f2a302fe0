//! Top-k similarity search over the live index, hydrated from the record store

use std::collections::HashMap;
use std::sync::Arc;

use super::index::l2_normalize;
use super::record_store::SharedRecordStore;
use super::synchronizer::IndexSynchronizer;
use crate::config::SearchConfig;
use crate::errors::StoreError;
use crate::models::{Platform, ScoredRecord};

/// Threshold actually applied to a candidate set whose best score is `max_score`.
///
/// When nothing clears `threshold` the bar drops to `max(floor, max_score * factor)`
/// so the closest matches still come back.
pub fn effective_threshold(max_score: f32, threshold: f32, settings: &SearchConfig) -> f32 {
  if threshold_missed(max_score, threshold) {
    (max_score * settings.relaxation_factor).max(settings.relaxation_floor)
  } else {
    threshold
  }
}

/// True when no candidate reached the caller's threshold
pub fn threshold_missed(max_score: f32, threshold: f32) -> bool {
  max_score < threshold
}

pub struct SimilaritySearchService {
  store: SharedRecordStore,
  synchronizer: Arc<IndexSynchronizer>,
  settings: SearchConfig,
}

impl SimilaritySearchService {
  pub fn new(store: SharedRecordStore, synchronizer: Arc<IndexSynchronizer>, settings: SearchConfig) -> Self {
    Self { store, synchronizer, settings }
  }

  pub async fn search(
    &self,
    query: &[f32],
    limit: usize,
    threshold: f32,
    platform: Option<&Platform>,
  ) -> Result<Vec<ScoredRecord>, StoreError> {
    if limit == 0 {
      return Ok(Vec::new());
    }

    let dimension = self.synchronizer.dimension();
    if query.len() != dimension.get() {
      return Err(StoreError::dimension_mismatch(dimension.get(), query.len()));
    }

    let mut snapshot = self.synchronizer.snapshot();
    if snapshot.is_empty() {
      bentley::warn!("Index is empty, rebuilding before search");
      self.synchronizer.rebuild().await?;
      snapshot = self.synchronizer.snapshot();
      if snapshot.is_empty() {
        bentley::warn!("Index is still empty after rebuild, no results");
        return Ok(Vec::new());
      }
    }

    let Some(query) = l2_normalize(query) else {
      bentley::warn!("Query embedding has zero magnitude, no results");
      return Ok(Vec::new());
    };

    let candidate_count = (limit.saturating_mul(self.settings.overfetch_factor.max(1))).min(snapshot.ntotal());
    let candidates = snapshot.search(&query, candidate_count)?;
    let Some(max_score) = candidates.first().map(|candidate| candidate.score) else {
      return Ok(Vec::new());
    };

    let effective = effective_threshold(max_score, threshold, &self.settings);
    if threshold_missed(max_score, threshold) {
      bentley::info!(&format!(
        "No candidate reached threshold {:.3} (best {:.3}), using {:.3}",
        threshold, max_score, effective
      ));
    }

    let scores: HashMap<String, f32> = candidates
      .into_iter()
      .filter(|candidate| candidate.score >= effective)
      .map(|candidate| (candidate.id, candidate.score))
      .collect();
    if scores.is_empty() {
      return Ok(Vec::new());
    }

    let ids: Vec<String> = scores.keys().cloned().collect();
    let records = self.store.fetch_many(&ids, platform).await?;

    let mut results: Vec<ScoredRecord> = records
      .into_iter()
      .filter_map(|record| {
        scores.get(&record.id).map(|similarity| ScoredRecord { similarity: *similarity, record })
      })
      .collect();

    results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then_with(|| a.record.id.cmp(&b.record.id)));
    results.truncate(limit);

    bentley::verbose!(&format!("Similarity search returned {} of {} candidates", results.len(), ids.len()));
    Ok(results)
  }
}
