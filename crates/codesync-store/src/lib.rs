//! Vector store client: collection lifecycle, hybrid (dense + sparse)
//! retrieval fused with reciprocal-rank fusion, batched writes and
//! filtered id lookup.

pub mod error;
pub mod in_memory_store;
pub mod qdrant_ops;
pub mod types;
pub mod vector_store;

pub use codesync_embed::SparseVector;
pub use error::StoreError;
pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_ops::QdrantStore;
pub use types::{
    FileMetadata, HybridVector, IndexedRecord, PayloadFilter, QueryHit, QueryOptions,
    RecordPayload,
};
pub use vector_store::VectorStore;
