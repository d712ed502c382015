//! Embedding Capability
//!
//! Every adapter implements the [`Embedder`] contract: a name, a fixed
//! dimension, and order-preserving single/batch embedding. Failure is always
//! non-fatal for writers — rows persist with a null embedding column and stay
//! reachable through the lexical arm.

mod hash;
#[cfg(feature = "embeddings")]
mod local;

pub use hash::HashEmbedder;
#[cfg(feature = "embeddings")]
pub use local::LocalEmbedder;

/// System-wide embedding dimension. All memory tables assume one dimension.
pub const EMBEDDING_DIMENSIONS: usize = 768;

/// Maximum text length for embedding (truncated if longer)
pub const MAX_TEXT_LENGTH: usize = 8192;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// The adapter cannot serve requests (model missing, provider down).
    #[error("Embedding unavailable: {0}")]
    Unavailable(String),
    /// A specific embed call failed.
    #[error("Embedding generation failed: {0}")]
    Failed(String),
    /// Invalid input (empty, wrong shape).
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// CAPABILITY CONTRACT
// ============================================================================

/// Pluggable dense-vector embedding capability.
pub trait Embedder: Send + Sync {
    /// Adapter name, reported by `/health`.
    fn name(&self) -> &str;

    /// Output vector length; must equal [`EMBEDDING_DIMENSIONS`] for vectors
    /// destined for the store.
    fn dimensions(&self) -> usize;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed many texts, preserving input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

// ============================================================================
// VECTOR CODEC & SIMILARITY
// ============================================================================

/// Encode a vector as a little-endian f32 blob for the embedding column.
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode an embedding column blob. Returns `None` on a malformed length.
pub fn vector_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Compute cosine similarity between two vectors
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        dot_product / denominator
    } else {
        0.0
    }
}

// ============================================================================
// TESTS
// ============================================================================
