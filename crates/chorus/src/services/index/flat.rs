use std::cmp::Ordering;

use crate::errors::StoreError;
use crate::services::dimension::Dimension;

/// Scale a vector to unit length. Zero-magnitude vectors have no direction and yield `None`.
pub fn l2_normalize(vector: &[f32]) -> Option<Vec<f32>> {
  // f64 so large finite components do not overflow the sum of squares
  let magnitude = vector.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt();
  if magnitude == 0.0 || !magnitude.is_finite() {
    return None;
  }
  Some(vector.iter().map(|&x| (f64::from(x) / magnitude) as f32).collect())
}

pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Positions and scores returned by [`FlatIpIndex::search`], best first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
  pub positions: Vec<usize>,
  pub scores: Vec<f32>,
}

impl SearchHits {
  pub fn is_empty(&self) -> bool {
    self.positions.is_empty()
  }

  pub fn max_score(&self) -> Option<f32> {
    self.scores.first().copied()
  }
}

/// Exhaustive inner-product index. Vectors are stored back to back in one buffer.
#[derive(Debug, Clone)]
pub struct FlatIpIndex {
  dimension: Dimension,
  data: Vec<f32>,
}

impl FlatIpIndex {
  pub fn new(dimension: Dimension) -> Self {
    Self { dimension, data: Vec::new() }
  }

  pub fn dimension(&self) -> Dimension {
    self.dimension
  }

  pub fn ntotal(&self) -> usize {
    self.data.len() / self.dimension.get()
  }

  /// Append vectors. Nothing is added if any vector has the wrong length.
  pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), StoreError> {
    for vector in vectors {
      self.check(vector)?;
    }
    self.data.reserve(vectors.len() * self.dimension.get());
    for vector in vectors {
      self.data.extend_from_slice(vector);
    }
    Ok(())
  }

  /// Overwrite the vector at `position`. Returns `false` when the position does not exist.
  pub fn replace(&mut self, position: usize, vector: &[f32]) -> Result<bool, StoreError> {
    self.check(vector)?;
    if position >= self.ntotal() {
      return Ok(false);
    }
    let d = self.dimension.get();
    self.data[position * d..(position + 1) * d].copy_from_slice(vector);
    Ok(true)
  }

  pub fn vector(&self, position: usize) -> Option<&[f32]> {
    let d = self.dimension.get();
    self.data.get(position * d..(position + 1) * d)
  }

  /// Up to `k` positions ordered by descending score. Equal scores keep insertion order.
  pub fn search(&self, query: &[f32], k: usize) -> Result<SearchHits, StoreError> {
    self.check(query)?;
    let k = k.min(self.ntotal());
    if k == 0 {
      return Ok(SearchHits::default());
    }

    let mut scored: Vec<(usize, f32)> = self
      .data
      .chunks_exact(self.dimension.get())
      .map(|vector| inner_product(query, vector))
      .enumerate()
      .collect();

    if k < scored.len() {
      scored.select_nth_unstable_by(k - 1, rank);
      scored.truncate(k);
    }
    scored.sort_by(rank);

    Ok(SearchHits {
      positions: scored.iter().map(|(position, _)| *position).collect(),
      scores: scored.iter().map(|(_, score)| *score).collect(),
    })
  }

  fn check(&self, vector: &[f32]) -> Result<(), StoreError> {
    if vector.len() != self.dimension.get() {
      return Err(StoreError::dimension_mismatch(self.dimension.get(), vector.len()));
    }
    Ok(())
  }
}

fn rank(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
  b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}
