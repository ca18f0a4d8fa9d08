//! Per-file reconciliation: read → chunk → embed → swap stored records.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Instant, UNIX_EPOCH};

use codesync_embed::{EmbedError, Embedder, embed_sparse};
use codesync_store::{
    FileMetadata, HybridVector, IndexedRecord, PayloadFilter, RecordPayload, VectorStore,
};

use crate::chunker::{ChunkerConfig, Fragment, chunk};
use crate::error::{IndexError, Result};
use crate::languages::is_indexable;

/// Indexer configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexerConfig {
    pub chunker: ChunkerConfig,
}

/// Outcome of reconciling one file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub fragments: usize,
    pub removed: usize,
    /// The file was empty and nothing was touched.
    pub skipped_empty: bool,
    pub duration_ms: u64,
}

/// Summary of a full tree walk.
#[derive(Debug, Default)]
pub struct TreeReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub fragments: usize,
    pub removed: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// One async mutex per `(collection, path)`; idle entries are pruned on access.
#[derive(Default)]
struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    fn lock_for(&self, collection: &str, file_path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(map.entry(format!("{collection}\0{file_path}")).or_default())
    }
}

/// Keeps the vector store in sync with files on disk.
pub struct CodeIndexer<E: Embedder> {
    store: Arc<dyn VectorStore>,
    embedder: Arc<E>,
    config: IndexerConfig,
    locks: KeyedLocks,
}

impl<E: Embedder> CodeIndexer<E> {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<E>, config: IndexerConfig) -> Self {
        Self {
            store,
            embedder,
            config,
            locks: KeyedLocks::default(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    #[must_use]
    pub fn embedder(&self) -> &Arc<E> {
        &self.embedder
    }

    /// Replace every stored record for `path` with fragments of its current
    /// content.
    ///
    /// Old records are deleted before the new batch is written. An empty file
    /// is skipped and its previous records stay in place.
    ///
    /// # Errors
    ///
    /// Returns the first failing step: missing collection, IO, chunking,
    /// embedding or a store call. Steps already completed are not undone.
    pub async fn reconcile_file(&self, collection: &str, path: &Path) -> Result<ReconcileReport> {
        let start = Instant::now();
        let file_path = path.to_string_lossy().into_owned();

        let lock = self.locks.lock_for(collection, &file_path);
        let _guard = lock.lock().await;

        if !self.store.collection_exists(collection).await? {
            return Err(IndexError::CollectionMissing(collection.to_string()));
        }

        let source = tokio::fs::read_to_string(path).await?;
        if source.is_empty() {
            tracing::info!(
                collection,
                file = %file_path,
                skipped_empty = true,
                "empty file, keeping existing records"
            );
            return Ok(ReconcileReport {
                skipped_empty: true,
                duration_ms: elapsed_ms(start),
                ..ReconcileReport::default()
            });
        }
        let fs_meta = tokio::fs::metadata(path).await?;

        let fragments = chunk(&source, &self.config.chunker)?;

        let texts: Vec<String> = fragments.iter().map(|f| f.content.clone()).collect();
        let dense = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_dense(&texts).await?
        };
        if dense.len() != fragments.len() {
            return Err(EmbedError::CountMismatch {
                expected: fragments.len(),
                actual: dense.len(),
            }
            .into());
        }

        let base = file_metadata(path, &file_path, &fs_meta);
        let records: Vec<IndexedRecord> = fragments
            .iter()
            .zip(dense)
            .map(|(fragment, vector)| build_record(fragment, vector, &base))
            .collect();

        let stale = self
            .store
            .find_ids_by_filter(collection, &PayloadFilter::for_file(file_path.clone()))
            .await?;
        let removed = stale.len();
        self.store.delete_by_ids(collection, stale).await?;

        let count = records.len();
        self.store.upsert(collection, records).await?;

        let report = ReconcileReport {
            fragments: count,
            removed,
            skipped_empty: false,
            duration_ms: elapsed_ms(start),
        };
        tracing::info!(
            collection,
            file = %file_path,
            fragments = report.fragments,
            removed = report.removed,
            duration_ms = report.duration_ms,
            "file reconciled"
        );
        Ok(report)
    }

    /// Reconcile every indexable file under `root`, honoring ignore files and
    /// skipping hidden entries. Per-file failures are collected, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::CollectionMissing`] if the collection does not exist.
    pub async fn reconcile_tree(&self, collection: &str, root: &Path) -> Result<TreeReport> {
        let start = Instant::now();
        if !self.store.collection_exists(collection).await? {
            return Err(IndexError::CollectionMissing(collection.to_string()));
        }

        let entries: Vec<_> = ignore::WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .build()
            .flatten()
            .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()) && is_indexable(e.path()))
            .collect();

        let total = entries.len();
        tracing::info!(collection, total, "tree reconcile started");

        let mut report = TreeReport::default();
        for (i, entry) in entries.iter().enumerate() {
            report.files_scanned += 1;
            match self.reconcile_file(collection, entry.path()).await {
                Ok(file) => {
                    if file.fragments > 0 {
                        report.files_indexed += 1;
                    }
                    report.fragments += file.fragments;
                    report.removed += file.removed;
                    tracing::debug!(
                        file = %entry.path().display(),
                        progress = format_args!("{}/{total}", i + 1),
                        fragments = file.fragments,
                    );
                }
                Err(e) => report.errors.push(format!("{}: {e}", entry.path().display())),
            }
        }

        report.duration_ms = elapsed_ms(start);
        Ok(report)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

/// File-level metadata shared by every fragment; line span is filled per record.
fn file_metadata(path: &Path, file_path: &str, meta: &std::fs::Metadata) -> FileMetadata {
    let file_last_modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));

    FileMetadata {
        file_path: file_path.to_string(),
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_extension: path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_size: meta.len(),
        file_last_modified,
        start_line: 0,
        end_line: 0,
    }
}

fn build_record(fragment: &Fragment, dense: Vec<f32>, base: &FileMetadata) -> IndexedRecord {
    IndexedRecord {
        id: uuid::Uuid::new_v4().to_string(),
        vector: HybridVector {
            dense,
            sparse: embed_sparse(&fragment.content),
        },
        payload: RecordPayload {
            code_string: fragment.content.clone(),
            metadata: FileMetadata {
                start_line: fragment.start_line,
                end_line: fragment.end_line,
                ..base.clone()
            },
        },
    }
}
