//! Embedding gateway: batched dense vectors from an OpenAI-compatible
//! endpoint and locally computed hashed sparse vectors.

pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub mod sparse;

pub use error::EmbedError;
pub use openai::OpenAiEmbedder;
pub use provider::Embedder;
pub use sparse::{SparseVector, embed_sparse};
