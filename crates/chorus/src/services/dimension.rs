//! One-time discovery of the embedding dimension

use std::fmt;

use serde::Serialize;

use super::codec::{self, RawEmbedding};
use super::embeddings::EmbeddingProvider;
use super::record_store::RecordStore;
use crate::config::IndexConfig;

/// Length every indexed vector must have. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Dimension(usize);

impl Dimension {
  /// Used when even the configured fallback is unusable
  pub const DEFAULT: Dimension = Dimension(768);

  pub fn new(value: usize) -> Option<Self> {
    (value > 0).then_some(Self(value))
  }

  pub fn get(self) -> usize {
    self.0
  }
}

impl fmt::Display for Dimension {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Where the dimension came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionSource {
  StoredEmbedding,
  Probe,
  Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedDimension {
  pub dimension: Dimension,
  pub source: DimensionSource,
}

/// Tries stored data first, then a probe embedding, then the configured constant
pub struct DimensionDetector<'a> {
  store: &'a dyn RecordStore,
  provider: Option<&'a dyn EmbeddingProvider>,
  config: &'a IndexConfig,
}

impl<'a> DimensionDetector<'a> {
  pub fn new(
    store: &'a dyn RecordStore,
    provider: Option<&'a dyn EmbeddingProvider>,
    config: &'a IndexConfig,
  ) -> Self {
    Self { store, provider, config }
  }

  /// Never fails. Errors along the way are logged and the next source is tried.
  pub async fn detect(&self) -> DetectedDimension {
    if let Some(dimension) = self.from_stored_embedding().await {
      bentley::info!(&format!("Embedding dimension {} detected from stored data", dimension));
      return DetectedDimension { dimension, source: DimensionSource::StoredEmbedding };
    }

    if let Some(dimension) = self.from_probe().await {
      bentley::info!(&format!("Embedding dimension {} detected from probe embedding", dimension));
      return DetectedDimension { dimension, source: DimensionSource::Probe };
    }

    let dimension = Dimension::new(self.config.fallback_dimension).unwrap_or(Dimension::DEFAULT);
    bentley::warn!(&format!("Could not detect embedding dimension, using fallback {}", dimension));
    DetectedDimension { dimension, source: DimensionSource::Fallback }
  }

  async fn from_stored_embedding(&self) -> Option<Dimension> {
    let column = match self.store.sample_embedding().await {
      Ok(Some(column)) => column,
      Ok(None) => return None,
      Err(e) => {
        bentley::warn!(&format!("Could not sample stored embeddings: {}", e));
        return None;
      }
    };

    let decoded = codec::decode(&RawEmbedding::Text(column));
    if decoded.is_none() {
      bentley::verbose!("Sampled stored embedding could not be decoded");
    }
    decoded.and_then(|vector| Dimension::new(vector.len()))
  }

  async fn from_probe(&self) -> Option<Dimension> {
    let provider = self.provider?;
    match provider.embed(&self.config.probe_text).await {
      Ok(vector) => Dimension::new(vector.len()),
      Err(e) => {
        bentley::warn!(&format!("Probe embedding failed: {}", e));
        None
      }
    }
  }
}
