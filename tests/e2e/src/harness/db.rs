//! Temp-database test context: storage, pipeline, and one seeded agent.

use std::sync::Arc;

use hexmem_core::embeddings::HashEmbedder;
use hexmem_core::extract::{ExtractiveSummarizer, RuleExtractor};
use hexmem_core::{
    Agent, Embedder, IngestPipeline, NewAgent, NewSession, Session, Storage,
};
use tempfile::TempDir;

pub struct TestContext {
    // Held so the database file outlives the test
    _dir: TempDir,
    pub storage: Arc<Storage>,
    pub pipeline: IngestPipeline,
    pub agent: Agent,
}

impl TestContext {
    /// Context with the deterministic hash embedder (the common case).
    pub fn new(agent_slug: &str) -> Self {
        Self::with_embedder(agent_slug, Some(Arc::new(HashEmbedder::default())))
    }

    /// Context with no embedder: lexical-only recall, 503 search.
    pub fn without_embedder(agent_slug: &str) -> Self {
        Self::with_embedder(agent_slug, None)
    }

    pub fn with_embedder(agent_slug: &str, embedder: Option<Arc<dyn Embedder>>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Arc::new(
            Storage::open(Some(dir.path().join("hexmem-test.db")), embedder).expect("storage"),
        );
        let agent = storage
            .create_agent(NewAgent {
                slug: agent_slug.to_string(),
                display_name: format!("Test agent {}", agent_slug),
                description: None,
                core_memory: None,
                config: None,
            })
            .expect("agent");
        let pipeline = IngestPipeline::new(
            storage.clone(),
            Arc::new(RuleExtractor::new()),
            Arc::new(ExtractiveSummarizer::new()),
        );
        Self {
            _dir: dir,
            storage,
            pipeline,
            agent,
        }
    }

    pub fn start_session(&self) -> Session {
        self.storage
            .create_session(NewSession {
                agent_id: self.agent.id.clone(),
                external_id: None,
                metadata: None,
            })
            .expect("session")
    }

    pub fn create_agent(&self, slug: &str) -> Agent {
        self.storage
            .create_agent(NewAgent {
                slug: slug.to_string(),
                display_name: format!("Test agent {}", slug),
                description: None,
                core_memory: None,
                config: None,
            })
            .expect("agent")
    }
}
