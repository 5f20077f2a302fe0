use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running counters for one storage instance
#[derive(Debug, Default)]
pub struct OperationCounters {
  records_inserted: AtomicU64,
  records_updated: AtomicU64,
  records_deleted: AtomicU64,
  searches_performed: AtomicU64,
  errors: AtomicU64,
}

impl OperationCounters {
  pub fn record_inserted(&self) {
    self.records_inserted.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_updated(&self) {
    self.records_updated.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_deleted(&self) {
    self.records_deleted.fetch_add(1, Ordering::Relaxed);
  }

  pub fn search_performed(&self) {
    self.searches_performed.fetch_add(1, Ordering::Relaxed);
  }

  pub fn error(&self) {
    self.errors.fetch_add(1, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> CounterSnapshot {
    CounterSnapshot {
      records_inserted: self.records_inserted.load(Ordering::Relaxed),
      records_updated: self.records_updated.load(Ordering::Relaxed),
      records_deleted: self.records_deleted.load(Ordering::Relaxed),
      searches_performed: self.searches_performed.load(Ordering::Relaxed),
      errors: self.errors.load(Ordering::Relaxed),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
  pub records_inserted: u64,
  pub records_updated: u64,
  pub records_deleted: u64,
  pub searches_performed: u64,
  pub errors: u64,
}

/// Counters plus what is currently in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
  #[serde(flatten)]
  pub counters: CounterSnapshot,
  pub total_records: u64,
  pub platform_counts: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_counters_accumulate() {
    let counters = OperationCounters::default();
    counters.record_inserted();
    counters.record_inserted();
    counters.record_updated();
    counters.error();

    let snapshot = counters.snapshot();
    assert_eq!(snapshot.records_inserted, 2);
    assert_eq!(snapshot.records_updated, 1);
    assert_eq!(snapshot.records_deleted, 0);
    assert_eq!(snapshot.errors, 1);
  }
}
