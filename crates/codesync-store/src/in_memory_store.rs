use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::RwLock;

use codesync_embed::SparseVector;

use crate::error::StoreError;
use crate::types::{
    HybridVector, IndexedRecord, PayloadFilter, QueryHit, QueryOptions, SCROLL_PAGE_SIZE,
};
use crate::vector_store::{BoxFuture, VectorStore};

/// Rank offset used in reciprocal-rank fusion.
const RRF_K: f32 = 60.0;

struct InMemoryCollection {
    // Ordered by id so paging is stable.
    records: BTreeMap<String, IndexedRecord>,
    indexed_fields: HashSet<String>,
}

/// Process-local [`VectorStore`] with the same query semantics as the
/// Qdrant backend. Used in tests and for offline runs.
pub struct InMemoryVectorStore {
    dense_size: usize,
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new(dense_size: usize) -> Self {
        Self {
            dense_size,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records stored for `file_path`, or `None` if the
    /// collection does not exist.
    #[must_use]
    pub fn count_for_file(&self, collection: &str, file_path: &str) -> Option<usize> {
        let cols = self.collections.read().ok()?;
        let col = cols.get(collection)?;
        Some(
            col.records
                .values()
                .filter(|r| r.payload.metadata.file_path == file_path)
                .count(),
        )
    }

    /// Stored code strings for `file_path`, ordered by line span then content.
    #[must_use]
    pub fn contents_for_file(&self, collection: &str, file_path: &str) -> Vec<String> {
        let Ok(cols) = self.collections.read() else {
            return Vec::new();
        };
        let Some(col) = cols.get(collection) else {
            return Vec::new();
        };
        let mut records: Vec<&IndexedRecord> = col
            .records
            .values()
            .filter(|r| r.payload.metadata.file_path == file_path)
            .collect();
        records.sort_by(|a, b| {
            let (ma, mb) = (&a.payload.metadata, &b.payload.metadata);
            ma.start_line
                .cmp(&mb.start_line)
                .then(ma.end_line.cmp(&mb.end_line))
                .then_with(|| a.payload.code_string.cmp(&b.payload.code_string))
        });
        records
            .into_iter()
            .map(|r| r.payload.code_string.clone())
            .collect()
    }

    #[must_use]
    pub fn has_payload_index(&self, collection: &str, field: &str) -> bool {
        self.collections
            .read()
            .ok()
            .and_then(|cols| cols.get(collection).map(|c| c.indexed_fields.contains(field)))
            .unwrap_or(false)
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new(384)
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .field("dense_size", &self.dense_size)
            .finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[allow(clippy::cast_precision_loss)]
fn sparse_dot(query: &SparseVector, doc: &SparseVector) -> f32 {
    let doc_terms: HashMap<u32, u32> = doc
        .indices
        .iter()
        .copied()
        .zip(doc.values.iter().copied())
        .collect();
    query
        .indices
        .iter()
        .zip(&query.values)
        .filter_map(|(i, q)| doc_terms.get(i).map(|d| (*q as f32) * (*d as f32)))
        .sum()
}

/// Rank the filtered records, best first, keeping at most `limit`.
fn ranked<'a>(mut scored: Vec<(&'a str, f32)>, limit: usize) -> impl Iterator<Item = &'a str> {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    scored.into_iter().take(limit).map(|(id, _)| id)
}

#[allow(clippy::cast_precision_loss)]
fn reciprocal_rank_fusion<'a>(lists: [Vec<&'a str>; 2]) -> Vec<(&'a str, f32)> {
    let mut fused: HashMap<&str, f32> = HashMap::new();
    for list in lists {
        for (rank, id) in list.into_iter().enumerate() {
            *fused.entry(id).or_default() += 1.0 / (RRF_K + (rank + 1) as f32);
        }
    }
    let mut fused: Vec<(&str, f32)> = fused.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    fused
}

impl VectorStore for InMemoryVectorStore {
    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn create_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            if cols.contains_key(&collection) {
                return Err(StoreError::Backend(format!(
                    "collection {collection} already exists"
                )));
            }
            cols.insert(
                collection,
                InMemoryCollection {
                    records: BTreeMap::new(),
                    indexed_fields: HashSet::new(),
                },
            );
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
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| StoreError::CollectionNotFound(collection.clone()))?;
            col.indexed_fields.insert(field);
            Ok(())
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            cols.remove(&collection);
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
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let col = cols
                .get(&collection)
                .ok_or_else(|| StoreError::CollectionNotFound(collection.clone()))?;

            let empty_filter = PayloadFilter::default();
            let filter = options.filter.as_ref().unwrap_or(&empty_filter);
            let candidates: Vec<&IndexedRecord> = col
                .records
                .values()
                .filter(|r| filter.matches(&r.payload.metadata))
                .collect();

            let prefetch = usize::try_from(options.prefetch_limit()).unwrap_or(usize::MAX);
            let dense: Vec<&str> = ranked(
                candidates
                    .iter()
                    .map(|r| (r.id.as_str(), cosine_similarity(&vector.dense, &r.vector.dense)))
                    .collect(),
                prefetch,
            )
            .collect();
            // Sparse search only returns records sharing at least one term.
            let sparse: Vec<&str> = ranked(
                candidates
                    .iter()
                    .map(|r| (r.id.as_str(), sparse_dot(&vector.sparse, &r.vector.sparse)))
                    .filter(|(_, score)| *score > 0.0)
                    .collect(),
                prefetch,
            )
            .collect();

            let limit = usize::try_from(options.limit).unwrap_or(usize::MAX);
            Ok(reciprocal_rank_fusion([dense, sparse])
                .into_iter()
                .filter(|(_, score)| *score >= options.score_threshold)
                .take(limit)
                .map(|(id, score)| QueryHit {
                    id: id.to_owned(),
                    score,
                    payload: options
                        .include_payload
                        .then(|| col.records.get(id).map(|r| r.payload.clone()))
                        .flatten(),
                })
                .collect())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        records: Vec<IndexedRecord>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| StoreError::CollectionNotFound(collection.clone()))?;
            if let Some(bad) = records
                .iter()
                .find(|r| r.vector.dense.len() != self.dense_size)
            {
                return Err(StoreError::Backend(format!(
                    "wrong dense vector size for {}: expected {}, got {}",
                    bad.id,
                    self.dense_size,
                    bad.vector.dense.len()
                )));
            }
            for record in records {
                col.records.insert(record.id.clone(), record);
            }
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
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| StoreError::CollectionNotFound(collection.clone()))?;
            for id in &ids {
                col.records.remove(id);
            }
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
        Box::pin(async move {
            filter.required_conditions()?;
            let cols = self
                .collections
                .read()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let col = cols
                .get(&collection)
                .ok_or_else(|| StoreError::CollectionNotFound(collection.clone()))?;

            let page_size = SCROLL_PAGE_SIZE as usize;
            let mut ids = Vec::new();
            let mut offset: Option<String> = None;
            loop {
                let (page, next) = scroll_page(col, &filter, offset.as_deref(), page_size);
                ids.extend(page);
                match next {
                    Some(next) => offset = Some(next),
                    None => break,
                }
            }
            Ok(ids)
        })
    }
}

/// One page of matching ids starting at `offset` (inclusive), plus the id
/// that starts the next page.
fn scroll_page(
    col: &InMemoryCollection,
    filter: &PayloadFilter,
    offset: Option<&str>,
    page_size: usize,
) -> (Vec<String>, Option<String>) {
    let range = match offset {
        Some(start) => col
            .records
            .range::<str, _>((Bound::Included(start), Bound::Unbounded)),
        None => col.records.range::<str, _>(..),
    };
    let mut matching = range
        .filter(|(_, r)| filter.matches(&r.payload.metadata))
        .map(|(id, _)| id.clone());
    let page: Vec<String> = matching.by_ref().take(page_size).collect();
    (page, matching.next())
}
