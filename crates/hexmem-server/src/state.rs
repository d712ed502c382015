//! Shared handler state: the composition root's wiring, cloned per request.

use std::sync::Arc;

use hexmem_core::{IngestPipeline, Storage};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub pipeline: Arc<IngestPipeline>,
    /// Development key granting `{read, write, admin}` with no agent scope.
    pub dev_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(pipeline: Arc<IngestPipeline>, dev_key: Option<String>) -> Self {
        Self {
            storage: pipeline.storage().clone(),
            pipeline,
            dev_key: dev_key.map(Arc::from),
        }
    }
}
