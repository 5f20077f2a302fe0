pub mod flat;
pub mod snapshot;

pub use flat::{inner_product, l2_normalize, FlatIpIndex, SearchHits};
pub use snapshot::{IndexChange, IndexMatch, IndexSnapshot};
