//! AST-based chunking, incremental per-file reconciliation and change
//! watching.
//!
//! A file change arrives over the watch socket, the indexer re-chunks the
//! file with tree-sitter, embeds every fragment (dense + sparse) and swaps
//! the file's stored records in the vector store.

pub mod chunker;
pub mod error;
pub mod indexer;
pub(crate) mod languages;
pub mod watcher;

pub use chunker::{ChunkerConfig, Fragment, FragmentKind, chunk};
pub use error::{ChunkError, IndexError, Result, WatchError};
pub use indexer::{CodeIndexer, IndexerConfig, ReconcileReport, TreeReport};
pub use watcher::{
    ChangeHandler, ChangeWatcher, Connector, FileChangeEvent, FrameStream, WatcherConfig,
    WatcherState, WsConnector, spawn_reindexer,
};
