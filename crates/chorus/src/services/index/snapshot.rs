use std::collections::HashMap;

use super::flat::FlatIpIndex;
use crate::errors::StoreError;
use crate::services::dimension::Dimension;

/// How a single vector landed in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexChange {
  Appended,
  Replaced,
}

/// A scored candidate from [`IndexSnapshot::search`]
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
  pub id: String,
  pub score: f32,
}

/// The flat index paired with the record id at every position.
///
/// `ids.len() == index.ntotal()` always holds. Snapshots are shared behind an `Arc`
/// and only mutated through copy-on-write.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
  index: FlatIpIndex,
  ids: Vec<String>,
  positions: HashMap<String, usize>,
  generation: u64,
}

impl IndexSnapshot {
  pub fn empty(dimension: Dimension) -> Self {
    Self { index: FlatIpIndex::new(dimension), ids: Vec::new(), positions: HashMap::new(), generation: 0 }
  }

  /// Build from already normalized vectors. A repeated id keeps its last vector.
  pub fn build(
    dimension: Dimension,
    entries: Vec<(String, Vec<f32>)>,
    generation: u64,
  ) -> Result<Self, StoreError> {
    let mut snapshot = Self::empty(dimension);
    snapshot.generation = generation;
    for (id, vector) in entries {
      snapshot.upsert(&id, vector)?;
    }
    Ok(snapshot)
  }

  pub fn dimension(&self) -> Dimension {
    self.index.dimension()
  }

  pub fn ntotal(&self) -> usize {
    self.ids.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn ids(&self) -> &[String] {
    &self.ids
  }

  pub fn contains(&self, id: &str) -> bool {
    self.positions.contains_key(id)
  }

  pub fn vector_for(&self, id: &str) -> Option<&[f32]> {
    self.positions.get(id).and_then(|position| self.index.vector(*position))
  }

  /// Replace the vector of an indexed id, or append a new entry
  pub fn upsert(&mut self, id: &str, vector: Vec<f32>) -> Result<IndexChange, StoreError> {
    if let Some(&position) = self.positions.get(id) {
      self.index.replace(position, &vector)?;
      return Ok(IndexChange::Replaced);
    }

    self.index.add(std::slice::from_ref(&vector))?;
    self.positions.insert(id.to_string(), self.ids.len());
    self.ids.push(id.to_string());
    Ok(IndexChange::Appended)
  }

  pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexMatch>, StoreError> {
    let hits = self.index.search(query, k)?;
    Ok(
      hits
        .positions
        .iter()
        .zip(hits.scores.iter())
        .filter_map(|(position, score)| {
          self.ids.get(*position).map(|id| IndexMatch { id: id.clone(), score: *score })
        })
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dim(n: usize) -> Dimension {
    Dimension::new(n).unwrap()
  }

  #[test]
  fn test_build_keeps_parallel_ids() {
    let snapshot = IndexSnapshot::build(
      dim(2),
      vec![("a".to_string(), vec![1.0, 0.0]), ("b".to_string(), vec![0.0, 1.0])],
      1,
    )
    .unwrap();

    assert_eq!(snapshot.ntotal(), 2);
    assert_eq!(snapshot.ids(), &["a".to_string(), "b".to_string()]);
    assert_eq!(snapshot.generation(), 1);
  }

  #[test]
  fn test_upsert_replaces_existing_id() {
    let mut snapshot = IndexSnapshot::empty(dim(2));
    assert_eq!(snapshot.upsert("a", vec![1.0, 0.0]).unwrap(), IndexChange::Appended);
    assert_eq!(snapshot.upsert("a", vec![0.0, 1.0]).unwrap(), IndexChange::Replaced);
    assert_eq!(snapshot.ntotal(), 1);
    assert_eq!(snapshot.vector_for("a"), Some(&[0.0, 1.0][..]));
  }

  #[test]
  fn test_search_maps_positions_to_ids() {
    let mut snapshot = IndexSnapshot::empty(dim(2));
    snapshot.upsert("a", vec![0.0, 1.0]).unwrap();
    snapshot.upsert("b", vec![1.0, 0.0]).unwrap();

    let matches = snapshot.search(&[1.0, 0.0], 2).unwrap();
    assert_eq!(matches[0].id, "b");
    assert_eq!(matches[1].id, "a");
  }

  #[test]
  fn test_clone_is_independent() {
    let mut original = IndexSnapshot::empty(dim(2));
    original.upsert("a", vec![1.0, 0.0]).unwrap();
    let frozen = original.clone();
    original.upsert("b", vec![0.0, 1.0]).unwrap();
    assert_eq!(frozen.ntotal(), 1);
    assert_eq!(original.ntotal(), 2);
  }
}
