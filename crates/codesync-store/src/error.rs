#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("vector store backend error: {0}")]
    Backend(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("invalid filter: {0}")]
    Filter(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<qdrant_client::QdrantError> for StoreError {
    fn from(e: qdrant_client::QdrantError) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
