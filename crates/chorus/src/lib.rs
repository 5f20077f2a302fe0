//! Community content storage with semantic similarity search.
//!
//! Records live in a SQLite table that is the only durable copy. A flat
//! inner-product index over normalized embeddings is rebuilt from that table on
//! open and kept current as records are written.

pub mod cli;
pub mod config;
pub mod errors;
pub mod models;
pub mod services;
pub mod stats;
pub mod storage;

pub use config::ChorusConfig;
pub use errors::{EmbeddingIssue, RecordRejection, StoreError};
pub use models::{Platform, Record, ScoredRecord, StoredRecord};
pub use services::codec::RawEmbedding;
pub use storage::{CommunityStorage, IndexStatus};
