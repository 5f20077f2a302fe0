pub mod codec;
pub mod dimension;
pub mod embeddings;
pub mod index;
pub mod record_store;
pub mod search;
pub mod synchronizer;

pub use codec::RawEmbedding;
pub use dimension::{DetectedDimension, Dimension, DimensionDetector, DimensionSource};
pub use embeddings::{EmbeddingProvider, RemoteEmbeddingProvider};
pub use record_store::{RecordStore, SharedRecordStore, SqliteRecordStore};
pub use search::SimilaritySearchService;
pub use synchronizer::{IndexOutcome, IndexSynchronizer, RebuildReport};
