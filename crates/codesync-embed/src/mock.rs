//! Test-only mock embedder.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::EmbedError;
use crate::provider::Embedder;

#[derive(Debug, Clone)]
pub struct MockEmbedder {
    pub dimensions: usize,
    pub fail: bool,
    calls: Arc<AtomicUsize>,
    batches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self {
            dimensions: 8,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
            batches: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of `embed_dense` calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every batch received, in call order.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    // Deterministic, text-dependent vector so similarity search has signal.
    fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = blake3::hash(text.as_bytes());
        digest
            .as_bytes()
            .iter()
            .cycle()
            .take(self.dimensions)
            .map(|b| f32::from(*b) / 255.0)
            .collect()
    }
}

impl Embedder for MockEmbedder {
    async fn embed_dense(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(texts.to_vec());
        }
        if self.fail {
            return Err(EmbedError::Status {
                status: 500,
                message: "mock embedding failure".into(),
            });
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}
