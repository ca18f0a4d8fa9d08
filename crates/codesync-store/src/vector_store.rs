use std::future::Future;
use std::pin::Pin;

use crate::error::StoreError;
use crate::types::{
    FILE_PATH_FIELD, HybridVector, IndexedRecord, PayloadFilter, QueryHit, QueryOptions,
};

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VectorStore: Send + Sync {
    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Create a collection with a dense (cosine, on-disk) and a sparse (IDF)
    /// vector field. An existing name is a backend error.
    fn create_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Declare a keyword index on a payload field.
    fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Hybrid search: dense and sparse candidates fused by reciprocal rank.
    fn query(
        &self,
        collection: &str,
        vector: HybridVector,
        options: QueryOptions,
    ) -> BoxFuture<'_, Result<Vec<QueryHit>, StoreError>>;

    /// Insert or overwrite records by id.
    fn upsert(
        &self,
        collection: &str,
        records: Vec<IndexedRecord>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Every id whose payload matches `filter`, collected page by page.
    fn find_ids_by_filter(
        &self,
        collection: &str,
        filter: &PayloadFilter,
    ) -> BoxFuture<'_, Result<Vec<String>, StoreError>>;

    /// Drop and recreate a collection together with its file path index.
    fn clear_collection<'a>(
        &'a self,
        collection: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if self.collection_exists(collection).await? {
                self.delete_collection(collection).await?;
            }
            self.create_collection(collection).await?;
            self.create_payload_index(collection, FILE_PATH_FIELD).await?;
            tracing::info!(collection, "collection cleared");
            Ok(())
        })
    }
}
