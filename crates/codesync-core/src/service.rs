//! Collection lifecycle, search, and reconciliation entry points used by the CLI.

use std::path::Path;
use std::sync::Arc;

use codesync_embed::{EmbedError, Embedder, embed_sparse};
use codesync_index::{CodeIndexer, IndexError, IndexerConfig, ReconcileReport, TreeReport};
use codesync_store::types::FILE_PATH_FIELD;
use codesync_store::{HybridVector, QueryHit, QueryOptions, StoreError, VectorStore};

/// Failure of a service operation; `Display` is the message shown to callers.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("collection not found: {0}")]
    CollectionMissing(String),

    #[error("query text must not be empty")]
    EmptyQuery,

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),
}

pub struct CodeSearchService<E: Embedder> {
    store: Arc<dyn VectorStore>,
    indexer: Arc<CodeIndexer<E>>,
}

impl<E: Embedder> CodeSearchService<E> {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<E>, config: IndexerConfig) -> Self {
        let indexer = Arc::new(CodeIndexer::new(Arc::clone(&store), embedder, config));
        Self { store, indexer }
    }

    /// Shared with the watcher's reindex task.
    #[must_use]
    pub fn indexer(&self) -> &Arc<CodeIndexer<E>> {
        &self.indexer
    }

    /// Create a collection and its file path index.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::CollectionExists`] if the name is taken, or the
    /// store error.
    pub async fn create_collection(&self, name: &str) -> Result<(), ServiceError> {
        if self.store.collection_exists(name).await? {
            return Err(ServiceError::CollectionExists(name.to_string()));
        }
        self.store.create_collection(name).await?;
        self.store.create_payload_index(name, FILE_PATH_FIELD).await?;
        tracing::info!(collection = name, "collection created");
        Ok(())
    }

    /// Hybrid search for `query_text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is blank, the collection is missing, or
    /// embedding or the store query fails.
    pub async fn query_collection(
        &self,
        collection: &str,
        query_text: &str,
        options: QueryOptions,
    ) -> Result<Vec<QueryHit>, ServiceError> {
        if query_text.trim().is_empty() {
            return Err(ServiceError::EmptyQuery);
        }
        if !self.store.collection_exists(collection).await? {
            return Err(ServiceError::CollectionMissing(collection.to_string()));
        }

        let dense = self
            .indexer
            .embedder()
            .embed_dense(&[query_text.to_string()])
            .await?
            .pop()
            .ok_or(EmbedError::CountMismatch {
                expected: 1,
                actual: 0,
            })?;
        let vector = HybridVector {
            dense,
            sparse: embed_sparse(query_text),
        };

        let hits = self.store.query(collection, vector, options).await?;
        tracing::debug!(collection, hits = hits.len(), "query served");
        Ok(hits)
    }

    /// # Errors
    ///
    /// Returns the failing reconciliation step.
    pub async fn reconcile_file(
        &self,
        collection: &str,
        path: &Path,
    ) -> Result<ReconcileReport, ServiceError> {
        Ok(self.indexer.reconcile_file(collection, path).await?)
    }

    /// # Errors
    ///
    /// Returns an error if the collection does not exist.
    pub async fn reconcile_tree(
        &self,
        collection: &str,
        root: &Path,
    ) -> Result<TreeReport, ServiceError> {
        Ok(self.indexer.reconcile_tree(collection, root).await?)
    }

    /// Drop every record by recreating the collection.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn clear_collection(&self, name: &str) -> Result<(), ServiceError> {
        self.store.clear_collection(name).await?;
        Ok(())
    }
}
