//! Extraction & Summarization Capabilities
//!
//! The ingestion pipeline treats both as pluggable: any adapter returning the
//! deterministic shapes below can sit behind the traits. Failures are
//! swallowed by callers — ingestion proceeds with empty extraction, session
//! end proceeds with a null summary.

mod rules;

pub use rules::{ExtractiveSummarizer, RuleExtractor};

use serde::Serialize;

use crate::memory::{EventSeverity, SessionMessage};

/// How many prior messages of the session form the extraction context.
pub const CONTEXT_WINDOW: usize = 4;

/// Capability failure. Callers log and continue.
#[derive(Debug, thiserror::Error)]
#[error("extraction failed: {0}")]
pub struct ExtractionError(pub String);

// ============================================================================
// EXTRACTED SHAPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedFact {
    pub content: String,
    pub subject: Option<String>,
    /// In [0, 1].
    pub confidence: f64,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedDecision {
    pub title: String,
    pub decision: String,
    pub rationale: Option<String>,
    pub alternatives: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedTask {
    pub title: String,
    pub description: Option<String>,
    /// In [1, 100], default 50.
    pub priority: i64,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedEvent {
    pub title: String,
    pub event_type: String,
    pub description: Option<String>,
    pub severity: EventSeverity,
    pub tags: Vec<String>,
}

/// The four arrays an extractor returns. All may be empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
    pub facts: Vec<ExtractedFact>,
    pub decisions: Vec<ExtractedDecision>,
    pub tasks: Vec<ExtractedTask>,
    pub events: Vec<ExtractedEvent>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
            && self.decisions.is_empty()
            && self.tasks.is_empty()
            && self.events.is_empty()
    }

    pub fn counts(&self) -> ExtractionCounts {
        ExtractionCounts {
            facts: self.facts.len(),
            decisions: self.decisions.len(),
            tasks: self.tasks.len(),
            events: self.events.len(),
        }
    }
}

/// Per-type counts returned from the ingestion hot path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionCounts {
    pub facts: usize,
    pub decisions: usize,
    pub tasks: usize,
    pub events: usize,
}

impl ExtractionCounts {
    pub fn total(&self) -> usize {
        self.facts + self.decisions + self.tasks + self.events
    }
}

// ============================================================================
// CAPABILITY CONTRACTS
// ============================================================================

/// Structured-item extraction over one message plus recent context.
pub trait Extractor: Send + Sync {
    fn extract(
        &self,
        message: &str,
        context: &[SessionMessage],
    ) -> Result<Extraction, ExtractionError>;
}

/// Session summarization.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, messages: &[SessionMessage]) -> Result<Option<String>, ExtractionError>;
}
