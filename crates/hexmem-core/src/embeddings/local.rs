//! Local ONNX embedding adapter (fastembed).
//!
//! nomic-embed-text-v1.5: 768 dimensions, 8192 token context, no external
//! API. The model loads lazily on first use; initialization failures surface
//! as `EmbeddingError::Unavailable` so callers degrade to the lexical path.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Mutex, OnceLock};

use super::{Embedder, EmbeddingError, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH};

/// Batch size for efficient embedding generation
const BATCH_SIZE: usize = 32;

static EMBEDDING_MODEL_RESULT: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

/// Cache directory for fastembed models: HEXMEM_MODEL_CACHE env var, or the
/// platform cache directory.
fn get_cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("HEXMEM_MODEL_CACHE") {
        return std::path::PathBuf::from(path);
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("io", "hexmem", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs.home_dir().join(".cache/hexmem/fastembed");
    }

    std::path::PathBuf::from(".fastembed_cache")
}

fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL_RESULT.get_or_init(|| {
        let cache_dir = get_cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("Failed to create cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(false)
            .with_cache_dir(cache_dir);

        TextEmbedding::try_new(options).map(Mutex::new).map_err(|e| {
            format!(
                "Failed to initialize nomic-embed-text-v1.5: {}. \
                Ensure ONNX runtime is available and model files can be downloaded.",
                e
            )
        })
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::Unavailable(format!("Lock poisoned: {}", e))),
        Err(err) => Err(EmbeddingError::Unavailable(err.clone())),
    }
}

/// Local fastembed adapter.
#[derive(Default)]
pub struct LocalEmbedder {
    _unused: (),
}

impl LocalEmbedder {
    pub fn new() -> Self {
        Self { _unused: () }
    }

    /// Eagerly load the model, surfacing download/init problems at boot.
    pub fn init(&self) -> Result<(), EmbeddingError> {
        get_model().map(|_| ())
    }
}

impl Embedder for LocalEmbedder {
    fn name(&self) -> &str {
        "nomic-embed-text-v1.5"
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".to_string()));
        }

        let mut model = get_model()?;

        let text = if text.len() > MAX_TEXT_LENGTH {
            &text[..MAX_TEXT_LENGTH]
        } else {
            text
        };

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Failed("no embedding generated".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = get_model()?;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let truncated: Vec<&str> = chunk
                .iter()
                .map(|t| {
                    if t.len() > MAX_TEXT_LENGTH {
                        &t[..MAX_TEXT_LENGTH]
                    } else {
                        *t
                    }
                })
                .collect();

            let embeddings = model
                .embed(truncated, None)
                .map_err(|e| EmbeddingError::Failed(e.to_string()))?;

            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }
}
