use std::str::FromStr;

use super::{Config, Secret};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CODESYNC_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("CODESYNC_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("CODESYNC_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(Secret::new(v));
        }
        if let Some(dimensions) = parsed_var("CODESYNC_EMBEDDING_DIMENSIONS") {
            self.embedding.dimensions = dimensions;
        }
        if let Some(secs) = parsed_var("CODESYNC_EMBEDDING_TIMEOUT_SECS") {
            self.embedding.timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("CODESYNC_QDRANT_URL") {
            self.qdrant.url = v;
        }
        if let Ok(v) = std::env::var("CODESYNC_COLLECTION") {
            self.qdrant.collection = v;
        }
        if let Some(max_size) = parsed_var("CODESYNC_CHUNK_MAX_SIZE") {
            self.chunker.max_size = max_size;
        }
        if let Some(overlap) = parsed_var("CODESYNC_CHUNK_OVERLAP") {
            self.chunker.overlap = overlap;
        }
        if let Ok(v) = std::env::var("CODESYNC_WATCH_URL") {
            self.watch.url = v;
        }
        if let Some(ms) = parsed_var("CODESYNC_WATCH_BASE_INTERVAL_MS") {
            self.watch.base_interval_ms = ms;
        }
        if let Some(n) = parsed_var("CODESYNC_WATCH_MAX_RECONNECT_ATTEMPTS") {
            self.watch.max_reconnect_attempts = n;
        }
    }
}

fn parsed_var<T: FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    match v.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("ignoring invalid {key} value: {v}");
            None
        }
    }
}
