//! Deterministic feature-hashing embedder.
//!
//! No model download, no network: tokens and character trigrams are hashed
//! into a fixed number of buckets and the result is L2-normalized. Quality is
//! far below a learned model, but the adapter is deterministic and cheap,
//! which makes it the right default for development boxes and CI.

use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbeddingError, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH};

/// Feature-hashing embedder with a configurable dimension.
pub struct HashEmbedder {
    dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIMENSIONS)
    }
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, feature: &str, salt: u64) -> (usize, f32) {
        let mut hasher = DefaultHasher::new();
        salt.hash(&mut hasher);
        feature.hash(&mut hasher);
        let h = hasher.finish();
        let index = (h % self.dimensions as u64) as usize;
        // Sign bit from a high-order bit keeps bucket collisions from only
        // ever accumulating positive mass.
        let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash-features"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".to_string()));
        }
        let text = if text.len() > MAX_TEXT_LENGTH {
            &text[..MAX_TEXT_LENGTH]
        } else {
            text
        };

        let mut vector = vec![0.0_f32; self.dimensions];
        let lowered = text.to_lowercase();

        // Word features
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let (i, sign) = self.bucket(word, 0x1);
            vector[i] += sign;

            // Character trigrams give partial credit to near-miss tokens
            let bytes = word.as_bytes();
            if bytes.len() >= 3 {
                for window in bytes.windows(3) {
                    let tri = std::str::from_utf8(window).unwrap_or_default();
                    let (i, sign) = self.bucket(tri, 0x3);
                    vector[i] += 0.5 * sign;
                }
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}
