//! Qdrant-backed [`VectorStore`].

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, Fusion, Modifier, NamedVectors, PointId, PointStruct,
    PointsIdsList, PrefetchQueryBuilder, Query, QueryPointsBuilder, ScoredPoint,
    ScrollPointsBuilder, SparseVectorParamsBuilder, SparseVectorsConfigBuilder,
    UpsertPointsBuilder, Value, Vector, VectorInput, VectorParamsBuilder, VectorsConfigBuilder,
    point_id::PointIdOptions, value::Kind,
};

use crate::error::StoreError;
use crate::types::{
    DENSE_VECTOR, HybridVector, IndexedRecord, PayloadFilter, QueryHit, QueryOptions,
    RecordPayload, SCROLL_PAGE_SIZE, SPARSE_VECTOR,
};
use crate::vector_store::{BoxFuture, VectorStore};

/// Thin wrapper over the [`Qdrant`] client for code fragment collections.
#[derive(Clone)]
pub struct QdrantStore {
    client: Qdrant,
    dense_size: u64,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore")
            .field("dense_size", &self.dense_size)
            .finish_non_exhaustive()
    }
}

impl QdrantStore {
    /// Create a store connected to the given URL. Collections created through
    /// it use `dense_size`-dimensional dense vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str, dense_size: u64) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url).build()?;
        Ok(Self { client, dense_size })
    }

    /// Access the underlying Qdrant client for advanced operations.
    #[must_use]
    pub fn client(&self) -> &Qdrant {
        &self.client
    }

    #[must_use]
    pub fn dense_size(&self) -> u64 {
        self.dense_size
    }

    async fn query_hybrid(
        &self,
        collection: &str,
        vector: HybridVector,
        options: QueryOptions,
    ) -> Result<Vec<QueryHit>, StoreError> {
        let filter = options
            .filter
            .as_ref()
            .map(payload_filter_to_qdrant)
            .filter(|f| !f.must.is_empty());
        let prefetch_limit = options.prefetch_limit();

        let mut dense = PrefetchQueryBuilder::default()
            .query(Query::new_nearest(vector.dense))
            .using(DENSE_VECTOR)
            .limit(prefetch_limit);
        let sparse_values: Vec<f32> = vector
            .sparse
            .values
            .iter()
            .map(|&v| count_to_f32(v))
            .collect();
        let mut sparse = PrefetchQueryBuilder::default()
            .query(Query::new_nearest(VectorInput::new_sparse(
                vector.sparse.indices,
                sparse_values,
            )))
            .using(SPARSE_VECTOR)
            .limit(prefetch_limit);
        if let Some(f) = filter {
            dense = dense.filter(f.clone());
            sparse = sparse.filter(f);
        }

        let builder = QueryPointsBuilder::new(collection)
            .add_prefetch(dense)
            .add_prefetch(sparse)
            .query(Query::new_fusion(Fusion::Rrf))
            .limit(options.limit)
            .score_threshold(options.score_threshold)
            .with_payload(options.include_payload);

        let response = self.client.query(builder).await?;
        tracing::debug!(
            collection,
            hits = response.result.len(),
            limit = options.limit,
            "hybrid query completed"
        );

        response
            .result
            .into_iter()
            .map(|p| scored_point_to_hit(p, options.include_payload))
            .collect()
    }

    async fn scroll_ids(
        &self,
        collection: &str,
        filter: &PayloadFilter,
    ) -> Result<Vec<String>, StoreError> {
        let qdrant_filter = payload_filter_to_qdrant(filter);
        if qdrant_filter.must.is_empty() {
            return Err(StoreError::Filter(
                "at least one equality condition is required".into(),
            ));
        }

        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .filter(qdrant_filter.clone())
                .with_payload(false)
                .with_vectors(false)
                .limit(SCROLL_PAGE_SIZE);

            if let Some(ref off) = offset {
                builder = builder.offset(off.clone());
            }

            let response = self.client.scroll(builder).await?;
            ids.extend(
                response
                    .result
                    .into_iter()
                    .filter_map(|p| p.id.and_then(point_id_to_string)),
            );

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(ids)
    }
}

impl VectorStore for QdrantStore {
    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move { Ok(self.client.collection_exists(&collection).await?) })
    }

    fn create_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut vectors = VectorsConfigBuilder::default();
            vectors.add_named_vector_params(
                DENSE_VECTOR,
                VectorParamsBuilder::new(self.dense_size, Distance::Cosine).on_disk(true),
            );
            let mut sparse = SparseVectorsConfigBuilder::default();
            sparse.add_named_vector_params(
                SPARSE_VECTOR,
                SparseVectorParamsBuilder::default().modifier(Modifier::Idf),
            );

            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&collection)
                        .vectors_config(vectors)
                        .sparse_vectors_config(sparse),
                )
                .await?;
            tracing::info!(collection, dense_size = self.dense_size, "collection created");
            Ok(())
        })
    }

    fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        let field = field.to_owned();
        Box::pin(async move {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &collection,
                    &field,
                    FieldType::Keyword,
                ))
                .await?;
            Ok(())
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client.delete_collection(&collection).await?;
            Ok(())
        })
    }

    fn query(
        &self,
        collection: &str,
        vector: HybridVector,
        options: QueryOptions,
    ) -> BoxFuture<'_, Result<Vec<QueryHit>, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move { self.query_hybrid(&collection, vector, options).await })
    }

    fn upsert(
        &self,
        collection: &str,
        records: Vec<IndexedRecord>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if records.is_empty() {
                return Ok(());
            }
            let count = records.len();
            let points = records
                .into_iter()
                .map(record_to_point)
                .collect::<Result<Vec<_>, _>>()?;
            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, points).wait(true))
                .await?;
            tracing::debug!(collection, count, "points upserted");
            Ok(())
        })
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(());
            }
            let count = ids.len();
            let ids: Vec<PointId> = ids.into_iter().map(PointId::from).collect();
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&collection)
                        .points(PointsIdsList { ids })
                        .wait(true),
                )
                .await?;
            tracing::debug!(collection, count, "points deleted");
            Ok(())
        })
    }

    fn find_ids_by_filter(
        &self,
        collection: &str,
        filter: &PayloadFilter,
    ) -> BoxFuture<'_, Result<Vec<String>, StoreError>> {
        let collection = collection.to_owned();
        let filter = filter.clone();
        Box::pin(async move { self.scroll_ids(&collection, &filter).await })
    }
}

fn payload_filter_to_qdrant(filter: &PayloadFilter) -> Filter {
    Filter::must(
        filter
            .conditions()
            .into_iter()
            .map(|(field, value)| Condition::matches(field, value.to_owned())),
    )
}

fn record_to_point(record: IndexedRecord) -> Result<PointStruct, StoreError> {
    let payload: HashMap<String, Value> = serde_json::from_value(record.payload.to_json()?)?;
    let sparse_values: Vec<f32> = record
        .vector
        .sparse
        .values
        .iter()
        .map(|&v| count_to_f32(v))
        .collect();
    let vectors = NamedVectors::default()
        .add_vector(DENSE_VECTOR, Vector::new_dense(record.vector.dense))
        .add_vector(
            SPARSE_VECTOR,
            Vector::new_sparse(record.vector.sparse.indices, sparse_values),
        );
    Ok(PointStruct::new(record.id, vectors, payload))
}

#[allow(clippy::cast_precision_loss)]
fn count_to_f32(count: u32) -> f32 {
    count as f32
}

fn scored_point_to_hit(point: ScoredPoint, include_payload: bool) -> Result<QueryHit, StoreError> {
    let payload = if include_payload && !point.payload.is_empty() {
        let json = serde_json::Value::Object(
            point
                .payload
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        );
        Some(RecordPayload::from_json(json)?)
    } else {
        None
    };

    Ok(QueryHit {
        id: point.id.and_then(point_id_to_string).unwrap_or_default(),
        score: point.score,
        payload,
    })
}

fn point_id_to_string(id: PointId) -> Option<String> {
    match id.point_id_options? {
        PointIdOptions::Uuid(u) => Some(u),
        PointIdOptions::Num(n) => Some(n.to_string()),
    }
}

fn qdrant_value_to_json(value: Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        ),
        Some(Kind::ListValue(l)) => {
            serde_json::Value::Array(l.values.into_iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use codesync_embed::SparseVector;

    use super::*;
    use crate::types::FileMetadata;

    fn record() -> IndexedRecord {
        IndexedRecord {
            id: "9f1c7c1e-3f43-4a53-9d0e-0f6d1b2a4c11".into(),
            vector: HybridVector {
                dense: vec![0.1, 0.2, 0.3],
                sparse: SparseVector {
                    indices: vec![7, 42],
                    values: vec![2, 1],
                },
            },
            payload: RecordPayload {
                code_string: "function a() { return 1; }".into(),
                metadata: FileMetadata {
                    file_path: "src/a.js".into(),
                    file_name: "a.js".into(),
                    file_extension: "js".into(),
                    file_size: 27,
                    file_last_modified: 1_700_000_000_000,
                    start_line: 1,
                    end_line: 1,
                },
            },
        }
    }

    #[test]
    fn new_valid_url() {
        let store = QdrantStore::new("http://localhost:6334", 384);
        assert!(store.is_ok());
        assert_eq!(store.unwrap().dense_size(), 384);
    }

    #[test]
    fn new_invalid_url() {
        assert!(QdrantStore::new("not a valid url", 384).is_err());
    }

    #[test]
    fn debug_format() {
        let store = QdrantStore::new("http://localhost:6334", 384).unwrap();
        let dbg = format!("{store:?}");
        assert!(dbg.contains("QdrantStore"));
        assert!(dbg.contains("384"));
    }

    #[test]
    fn record_to_point_keeps_nested_payload() {
        let point = record_to_point(record()).unwrap();
        assert!(point.payload.contains_key("codeString"));
        let metadata = point.payload.get("metadata").unwrap();
        assert!(matches!(metadata.kind, Some(Kind::StructValue(_))));
        assert!(point.vectors.is_some());
    }

    #[test]
    fn payload_round_trips_through_qdrant_values() {
        let original = record().payload;
        let payload: HashMap<String, Value> =
            serde_json::from_value(original.to_json().unwrap()).unwrap();
        let json = serde_json::Value::Object(
            payload
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        );
        assert_eq!(RecordPayload::from_json(json).unwrap(), original);
    }

    #[test]
    fn filter_maps_each_field_to_must_condition() {
        let filter = PayloadFilter {
            file_path: Some("src/a.js".into()),
            file_name: Some("a.js".into()),
            file_extension: None,
        };
        assert_eq!(payload_filter_to_qdrant(&filter).must.len(), 2);
        let empty = payload_filter_to_qdrant(&PayloadFilter::default());
        assert!(empty.must.is_empty());
    }

    #[test]
    fn point_id_to_string_variants() {
        assert_eq!(
            point_id_to_string(PointId::from("abc".to_string())).as_deref(),
            Some("abc")
        );
        assert_eq!(point_id_to_string(PointId::from(7_u64)).as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn find_ids_with_empty_filter_fails_before_network() {
        let store = QdrantStore::new("http://127.0.0.1:1", 3).unwrap();
        let err = store
            .find_ids_by_filter("code", &PayloadFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Filter(_)));
    }
}
