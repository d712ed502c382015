//! # HexMem Core
//!
//! Structured semantic memory engine for autonomous agents:
//!
//! - **Typed memory graph**: facts, decisions, tasks, events, and session
//!   messages linked by directed, weighted edges
//! - **Hybrid recall**: weighted fusion of semantic (cosine), lexical
//!   (trigram), and recency signals with one-hop graph expansion
//! - **Ingestion pipeline**: message persistence, context assembly,
//!   structured extraction, best-effort embedding, derivation edges
//! - **Decay lifecycle**: active → cooling → archived, moderated by
//!   per-agent TTL policies and access-based immunity
//! - **Two-stage dedup**: trigram then cosine, with contract thresholds
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hexmem_core::{recall, IngestPipeline, RecallRequest, Storage};
//! use hexmem_core::embeddings::HashEmbedder;
//! use hexmem_core::extract::{ExtractiveSummarizer, RuleExtractor};
//!
//! let storage = Arc::new(Storage::open(None, Some(Arc::new(HashEmbedder::default())))?);
//! let pipeline = IngestPipeline::new(
//!     storage.clone(),
//!     Arc::new(RuleExtractor::new()),
//!     Arc::new(ExtractiveSummarizer::new()),
//! );
//!
//! let outcome = pipeline.add_message(&session_id, message)?;
//! let response = recall::recall(&storage, request)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): local ONNX embedding adapter via fastembed
//! - `bundled-sqlite` (default): compile SQLite into the binary

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod analytics;
pub mod decay;
pub mod dedup;
pub mod embeddings;
pub mod extract;
pub mod ingest;
pub mod memory;
pub mod recall;
pub mod storage;
pub mod text;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Memory model
pub use memory::{
    Agent, AgentPatch, ApiKey, DecayPolicy, DecayStatus, Decision, DecisionPatch, Event,
    EventPatch, EventSeverity, Fact, FactPatch, MemoryEdge, MemoryKind, NewAgent, NewDecision,
    NewEdge, NewEvent, NewFact, NewMessage, NewProject, NewSession, NewTask, NodeKind, Permission,
    Project, ProjectPatch, ProjectStatus, Relation, Role, Session, SessionMessage, Task, TaskPatch,
    TaskStatus,
};

// Storage layer
pub use storage::{
    merge_patch, AgentCounts, EdgeFilter, ListFilter, NodeSummary, Result, Storage, StoreError,
};

// Capabilities
pub use embeddings::{cosine_similarity, Embedder, EmbeddingError, EMBEDDING_DIMENSIONS};
pub use extract::{Extraction, ExtractionCounts, Extractor, Summarizer};

// Pipelines & planners
pub use dedup::{DedupMatch, DedupStage};
pub use ingest::{IngestOutcome, IngestPipeline};
pub use recall::{RecallRequest, RecallResponse, RecallResult, SearchRequest, SearchResponse};

// Decay engine
pub use decay::{DecayStatusReport, SweepStats};

// Re-exported so downstream crates (tests, maintenance tools) can use the
// connection escape hatch without a version-skewed direct dependency.
pub use rusqlite;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
