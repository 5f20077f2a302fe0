pub mod record;

pub use record::{Platform, Record, ScoredRecord, StoredRecord};
