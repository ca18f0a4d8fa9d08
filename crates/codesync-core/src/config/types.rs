use std::fmt;
use std::time::Duration;

use codesync_index::{ChunkerConfig, IndexerConfig, WatcherConfig};
use serde::Deserialize;

/// Wrapper for sensitive strings with redacted Debug/Display.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub chunker: ChunkConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

fn default_embedding_base_url() -> String {
    "http://localhost:11434/v1".into()
}

fn default_embedding_model() -> String {
    "all-minilm".into()
}

fn default_dimensions() -> u64 {
    384
}

fn default_timeout_secs() -> u64 {
    120
}

/// OpenAI-compatible embeddings endpoint.
#[derive(Debug, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<Secret>,
    /// Dense vector size; must match the model output.
    #[serde(default = "default_dimensions")]
    pub dimensions: u64,
    /// Per-request timeout for embedding calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            api_key: None,
            dimensions: default_dimensions(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_collection() -> String {
    "codebase".into()
}

#[derive(Debug, Deserialize)]
pub struct QdrantConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    /// Collection used when a command does not name one.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection(),
        }
    }
}

fn default_max_size() -> usize {
    1000
}

fn default_overlap() -> usize {
    200
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChunkConfig {
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_watch_url() -> String {
    "ws://127.0.0.1:3001".into()
}

fn default_base_interval_ms() -> u64 {
    1000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_watch_url")]
    pub url: String,
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            url: default_watch_url(),
            base_interval_ms: default_base_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            chunker: ChunkerConfig {
                max_size: self.chunker.max_size,
                overlap: self.chunker.overlap,
            },
        }
    }

    #[must_use]
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            url: self.watch.url.clone(),
            base_interval: Duration::from_millis(self.watch.base_interval_ms),
            max_reconnect_attempts: self.watch.max_reconnect_attempts,
        }
    }
}
