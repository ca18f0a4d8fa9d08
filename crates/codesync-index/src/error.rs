//! Error types for codesync-index.

/// Errors raised while segmenting a source file.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// The grammar could not be loaded into the parser.
    #[error("grammar unavailable: {0}")]
    Grammar(String),

    /// The source is not valid for the configured grammar.
    #[error("parse failed: {0}")]
    Parse(String),
}

/// Errors that can occur while reconciling a file with the vector store.
/// Each variant names the step that failed.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("collection not found: {0}")]
    CollectionMissing(String),

    /// IO error reading the source file or its metadata.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunking failed: {0}")]
    Chunk(#[from] ChunkError),

    #[error("embedding failed: {0}")]
    Embed(#[from] codesync_embed::EmbedError),

    #[error("vector store error: {0}")]
    Store(#[from] codesync_store::StoreError),
}

/// Watch socket failures. These only drive reconnection and are never
/// returned to callers.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("socket error: {0}")]
    Socket(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
