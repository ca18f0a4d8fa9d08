//! Hashed bag-of-words sparse vectors for lexical matching.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

/// Term-frequency vector keyed by token hash.
///
/// Distinct tokens that hash to the same index share a count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<u32>,
}

impl SparseVector {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Count stored for a token, if it occurs.
    #[must_use]
    pub fn count_of(&self, token: &str) -> Option<u32> {
        let key = token_hash(&token.to_lowercase());
        self.indices
            .iter()
            .position(|&i| i == key)
            .map(|pos| self.values[pos])
    }
}

/// Build a sparse vector from lowercased `\w+` tokens.
///
/// Entries appear in first-occurrence order of their hash.
#[must_use]
pub fn embed_sparse(text: &str) -> SparseVector {
    let lowered = text.to_lowercase();
    let mut positions: HashMap<u32, usize> = HashMap::new();
    let mut vector = SparseVector::default();

    for token in WORD_RE.find_iter(&lowered) {
        let key = token_hash(token.as_str());
        if let Some(&pos) = positions.get(&key) {
            vector.values[pos] += 1;
        } else {
            positions.insert(key, vector.indices.len());
            vector.indices.push(key);
            vector.values.push(1);
        }
    }

    vector
}

/// Stable 32-bit token hash: the first four bytes of the BLAKE3 digest.
#[must_use]
pub fn token_hash(token: &str) -> u32 {
    let digest = blake3::hash(token.as_bytes());
    let bytes = digest.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
