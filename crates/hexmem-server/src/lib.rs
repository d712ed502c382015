//! HexMem HTTP service library.
//!
//! The binaries are thin: `hexmem-server` wires [`compose`] + the router +
//! background tickers; `hexmem` is the HTTP client CLI.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use hexmem_core::embeddings::HashEmbedder;
#[cfg(feature = "embeddings")]
use hexmem_core::embeddings::LocalEmbedder;
use hexmem_core::extract::{ExtractiveSummarizer, RuleExtractor};
use hexmem_core::{Embedder, IngestPipeline, Storage};

use crate::config::Config;
use crate::state::AppState;

/// Build the embedder named by configuration.
pub fn build_embedder(name: &str) -> anyhow::Result<Option<Arc<dyn Embedder>>> {
    match name {
        "none" => Ok(None),
        "hash" => Ok(Some(Arc::new(HashEmbedder::default()))),
        #[cfg(feature = "embeddings")]
        "local" => Ok(Some(Arc::new(LocalEmbedder::new()))),
        #[cfg(not(feature = "embeddings"))]
        "local" => anyhow::bail!("embedder 'local' requires the 'embeddings' feature"),
        other => anyhow::bail!("unknown embedder '{}' (expected local, hash, or none)", other),
    }
}

/// Construction-time composition root: storage, capabilities, pipeline.
pub fn compose(config: &Config) -> anyhow::Result<AppState> {
    let embedder = build_embedder(&config.embedder)?;
    if let Some(embedder) = &embedder {
        tracing::info!(embedder = embedder.name(), "embedder configured");
    } else {
        tracing::warn!("no embedder configured; semantic retrieval disabled");
    }

    let storage = Arc::new(Storage::open(config.db_path.clone(), embedder)?);
    let pipeline = Arc::new(IngestPipeline::new(
        storage,
        Arc::new(RuleExtractor::new()),
        Arc::new(ExtractiveSummarizer::new()),
    ));

    Ok(AppState::new(pipeline, config.dev_key.clone()))
}
