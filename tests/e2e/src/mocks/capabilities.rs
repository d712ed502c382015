//! Scripted capability adapters for failure-path journeys.

use hexmem_core::extract::{
    Extraction, ExtractionError, Extractor,
};
use hexmem_core::{Embedder, EmbeddingError, SessionMessage};

/// Embeds everything to one constant vector: cosine similarity is always 1.
pub struct ConstEmbedder {
    pub dimensions: usize,
}

impl Default for ConstEmbedder {
    fn default() -> Self {
        Self { dimensions: 8 }
    }
}

impl Embedder for ConstEmbedder {
    fn name(&self) -> &str {
        "const"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![1.0; self.dimensions])
    }
}

/// Always fails: exercises the write-without-embedding and lexical-fallback
/// paths.
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> usize {
        8
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unavailable("scripted outage".to_string()))
    }
}

/// Returns a fixed extraction regardless of input.
pub struct ScriptedExtractor {
    pub extraction: Extraction,
}

impl Extractor for ScriptedExtractor {
    fn extract(
        &self,
        _message: &str,
        _context: &[SessionMessage],
    ) -> Result<Extraction, ExtractionError> {
        Ok(self.extraction.clone())
    }
}

/// Always fails: ingestion must continue with empty counts.
pub struct FailingExtractor;

impl Extractor for FailingExtractor {
    fn extract(
        &self,
        _message: &str,
        _context: &[SessionMessage],
    ) -> Result<Extraction, ExtractionError> {
        Err(ExtractionError("scripted extractor outage".to_string()))
    }
}
