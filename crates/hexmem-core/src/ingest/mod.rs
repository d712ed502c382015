//! Ingestion Pipeline
//!
//! The message hot path: persist, assemble tail context, extract, store each
//! item, link a derivation edge. Extraction, embedding, and edge creation are
//! independent best-effort stages — a failed stage logs and the request keeps
//! going. Extraction is authoritative: pipeline writes never reject on dedup.
//!
//! Direct writes are the opposite: they run the near-duplicate detector first
//! and surface a conflict instead of inserting.

use std::sync::Arc;

use serde::Serialize;

use crate::dedup::{self, DedupMatch};
use crate::extract::{
    Extraction, ExtractionCounts, Extractor, Summarizer, CONTEXT_WINDOW,
};
use crate::memory::{
    Decision, Event, Fact, MemoryKind, NewDecision, NewEdge, NewEvent, NewFact, NewMessage,
    NewProject, NewTask, NodeKind, Project, Session, SessionMessage, Task,
};
use crate::storage::{Result, Storage, StoreError};

/// What the ingestion hot path returns: the persisted message plus counts per
/// extracted type.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub message: SessionMessage,
    pub extracted: ExtractionCounts,
}

/// The composition root wires the pipeline with its capabilities once at
/// startup; handlers share it via `Arc`.
pub struct IngestPipeline {
    storage: Arc<Storage>,
    extractor: Arc<dyn Extractor>,
    summarizer: Arc<dyn Summarizer>,
}

impl IngestPipeline {
    pub fn new(
        storage: Arc<Storage>,
        extractor: Arc<dyn Extractor>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            storage,
            extractor,
            summarizer,
        }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// The ingestion hot path.
    pub fn add_message(&self, session_id: &str, input: NewMessage) -> Result<IngestOutcome> {
        if input.content.trim().is_empty() {
            return Err(StoreError::InvalidArgument("content is required".to_string()));
        }

        let session = self.storage.get_session(session_id)?;
        if session.is_ended() {
            return Err(StoreError::InvalidArgument(format!(
                "session '{}' already ended",
                session_id
            )));
        }

        // Tail context is the prior messages, oldest first
        let context = self.storage.recent_messages(&session.id, CONTEXT_WINDOW)?;

        let embedding = self.storage.try_embed(&input.content);
        let message = self.storage.insert_message(&session, &input, embedding)?;

        let extraction = match self.extractor.extract(&message.content, &context) {
            Ok(extraction) => extraction,
            Err(e) => {
                tracing::warn!("extraction failed, ingest continues empty: {}", e);
                Extraction::default()
            }
        };
        let counts = extraction.counts();

        self.store_extraction(&session, extraction);

        Ok(IngestOutcome {
            message,
            extracted: counts,
        })
    }

    /// Store every extracted item. Per-item failures log and are skipped so a
    /// bad item never loses its siblings.
    fn store_extraction(&self, session: &Session, extraction: Extraction) {
        for fact in extraction.facts {
            let input = NewFact {
                content: fact.content,
                subject: fact.subject,
                confidence: fact.confidence,
                source: Some("extraction".to_string()),
                tags: fact.tags,
                valid_from: None,
                valid_until: None,
            };
            match self.storage.insert_fact(&session.agent_id, &input) {
                Ok(row) => self.derivation_edge(session, MemoryKind::Fact, &row.id),
                Err(e) => tracing::warn!("failed to store extracted fact: {}", e),
            }
        }

        for decision in extraction.decisions {
            let input = NewDecision {
                title: decision.title,
                decision: decision.decision,
                rationale: decision.rationale,
                alternatives: decision.alternatives,
                context: None,
                session_id: Some(session.id.clone()),
                tags: decision.tags,
            };
            match self.storage.insert_decision(&session.agent_id, &input) {
                Ok(row) => self.derivation_edge(session, MemoryKind::Decision, &row.id),
                Err(e) => tracing::warn!("failed to store extracted decision: {}", e),
            }
        }

        for task in extraction.tasks {
            let input = NewTask {
                title: task.title,
                description: task.description,
                project_id: None,
                status: Default::default(),
                priority: task.priority,
                assignee: None,
                due_date: None,
                blocked_by: None,
                tags: task.tags,
            };
            match self.storage.insert_task(&session.agent_id, &input) {
                Ok(row) => self.derivation_edge(session, MemoryKind::Task, &row.id),
                Err(e) => tracing::warn!("failed to store extracted task: {}", e),
            }
        }

        for event in extraction.events {
            let input = NewEvent {
                title: event.title,
                event_type: event.event_type,
                description: event.description,
                outcome: None,
                project_id: None,
                caused_by: None,
                severity: event.severity,
                occurred_at: None,
                resolved_at: None,
                tags: event.tags,
            };
            match self.storage.insert_event(&session.agent_id, &input) {
                Ok(row) => self.derivation_edge(session, MemoryKind::Event, &row.id),
                Err(e) => tracing::warn!("failed to store extracted event: {}", e),
            }
        }
    }

    /// Idempotent derivation edge back to the originating session.
    fn derivation_edge(&self, session: &Session, kind: MemoryKind, id: &str) {
        let edge = NewEdge {
            agent_id: session.agent_id.clone(),
            source_type: kind.into(),
            source_id: id.to_string(),
            target_type: NodeKind::Session,
            target_id: session.id.clone(),
            relation: kind.derivation_relation(),
            weight: 1.0,
            metadata: None,
        };
        if let Err(e) = self.storage.upsert_edge(&edge) {
            tracing::warn!("failed to create derivation edge for {} '{}': {}", kind, id, e);
        }
    }

    /// Summarize (best-effort) and mark the session ended. Re-ending an ended
    /// session is rejected before summarization runs.
    pub fn end_session(&self, session_id: &str) -> Result<Session> {
        let session = self.storage.get_session(session_id)?;
        if session.is_ended() {
            return Err(StoreError::InvalidArgument(format!(
                "session '{}' already ended",
                session_id
            )));
        }

        let messages = self.storage.list_messages(&session.id)?;
        let summary = match self.summarizer.summarize(&messages) {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("summarization failed, session ends without summary: {}", e);
                None
            }
        };

        self.storage.end_session(session_id, summary)
    }
}

// ============================================================================
// DIRECT WRITES (dedup-checked)
// ============================================================================

fn conflict_from(kind: MemoryKind, m: DedupMatch) -> StoreError {
    StoreError::Conflict {
        message: format!("near-duplicate {} detected", kind),
        existing_id: Some(m.id),
        similarity: Some(m.similarity),
    }
}

/// POST /facts: dedup on content, then insert.
pub fn create_fact_checked(storage: &Storage, agent: &str, input: NewFact) -> Result<Fact> {
    let agent_id = storage.resolve_agent_id(agent)?;
    if let Some(m) = dedup::find_duplicate(storage, MemoryKind::Fact, &agent_id, &input.content)? {
        return Err(conflict_from(MemoryKind::Fact, m));
    }
    storage.insert_fact(&agent_id, &input)
}

/// POST /decisions: dedup on `"{title}: {decision}"`, then insert; a
/// `session_id` gets the decided_in edge like pipeline writes do.
pub fn create_decision_checked(
    storage: &Storage,
    agent: &str,
    input: NewDecision,
) -> Result<Decision> {
    let agent_id = storage.resolve_agent_id(agent)?;
    let canonical = format!("{}: {}", input.title, input.decision);
    if let Some(m) = dedup::find_duplicate(storage, MemoryKind::Decision, &agent_id, &canonical)? {
        return Err(conflict_from(MemoryKind::Decision, m));
    }
    let decision = storage.insert_decision(&agent_id, &input)?;

    if let Some(session_id) = &decision.session_id {
        let edge = NewEdge {
            agent_id: agent_id.clone(),
            source_type: NodeKind::Decision,
            source_id: decision.id.clone(),
            target_type: NodeKind::Session,
            target_id: session_id.clone(),
            relation: MemoryKind::Decision.derivation_relation(),
            weight: 1.0,
            metadata: None,
        };
        if let Err(e) = storage.upsert_edge(&edge) {
            tracing::warn!("failed to link decision '{}' to session: {}", decision.id, e);
        }
    }

    Ok(decision)
}

/// POST /tasks: dedup on title, then insert.
pub fn create_task_checked(storage: &Storage, agent: &str, input: NewTask) -> Result<Task> {
    let agent_id = storage.resolve_agent_id(agent)?;
    if let Some(m) = dedup::find_duplicate(storage, MemoryKind::Task, &agent_id, &input.title)? {
        return Err(conflict_from(MemoryKind::Task, m));
    }
    storage.insert_task(&agent_id, &input)
}

/// POST /events: dedup on title, then insert.
pub fn create_event_checked(storage: &Storage, agent: &str, input: NewEvent) -> Result<Event> {
    let agent_id = storage.resolve_agent_id(agent)?;
    if let Some(m) = dedup::find_duplicate(storage, MemoryKind::Event, &agent_id, &input.title)? {
        return Err(conflict_from(MemoryKind::Event, m));
    }
    storage.insert_event(&agent_id, &input)
}

/// POST /projects: no dedup; slug uniqueness is the constraint.
pub fn create_project(storage: &Storage, agent: &str, input: NewProject) -> Result<Project> {
    let agent_id = storage.resolve_agent_id(agent)?;
    storage.insert_project(&agent_id, &input)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractiveSummarizer, RuleExtractor};
    use crate::memory::{NewAgent, NewSession, Role};
    use crate::storage::EdgeFilter;

    fn pipeline() -> (tempfile::TempDir, IngestPipeline, String, Session) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open(Some(dir.path().join("test.db")), None).unwrap());
        let agent = storage
            .create_agent(NewAgent {
                slug: "ingest-test".to_string(),
                display_name: "Ingest".to_string(),
                description: None,
                core_memory: None,
                config: None,
            })
            .unwrap();
        let session = storage
            .create_session(NewSession {
                agent_id: agent.id.clone(),
                external_id: None,
                metadata: None,
            })
            .unwrap();
        let pipeline = IngestPipeline::new(
            storage,
            Arc::new(RuleExtractor::new()),
            Arc::new(ExtractiveSummarizer::new()),
        );
        (dir, pipeline, agent.id, session)
    }

    fn user_message(content: &str) -> NewMessage {
        NewMessage {
            role: Role::User,
            content: content.to_string(),
            metadata: None,
        }
    }

    #[test]
    fn ingest_extracts_and_links_derivation_edges() {
        let (_dir, pipeline, agent_id, session) = pipeline();

        let outcome = pipeline
            .add_message(
                &session.id,
                user_message(
                    "We decided to use PostgreSQL for the database because it supports vector \
                     extensions. The main task is to implement the search feature by next Friday.",
                ),
            )
            .unwrap();

        assert!(outcome.extracted.total() >= 2);
        assert_eq!(outcome.extracted.decisions, 1);
        assert_eq!(outcome.extracted.tasks, 1);

        // Every extracted item carries an edge back to the session
        let edges = pipeline
            .storage()
            .list_edges(&EdgeFilter {
                agent: Some(agent_id),
                target_type: Some(NodeKind::Session),
                target_id: Some(session.id.clone()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(edges.len(), outcome.extracted.total());

        // The stored decision carries the session id
        let decisions = pipeline
            .storage()
            .list_decisions(&Default::default())
            .unwrap();
        assert_eq!(decisions[0].session_id.as_deref(), Some(session.id.as_str()));
    }

    #[test]
    fn pipeline_writes_allow_duplicates() {
        let (_dir, pipeline, _agent_id, session) = pipeline();
        let text = "We decided to ship the beta on Monday.";

        let first = pipeline.add_message(&session.id, user_message(text)).unwrap();
        let second = pipeline.add_message(&session.id, user_message(text)).unwrap();
        assert_eq!(first.extracted.decisions, 1);
        assert_eq!(second.extracted.decisions, 1);

        let decisions = pipeline
            .storage()
            .list_decisions(&Default::default())
            .unwrap();
        assert_eq!(decisions.len(), 2);
    }

    #[test]
    fn direct_write_conflicts_on_duplicate() {
        let (_dir, pipeline, agent_id, _session) = pipeline();
        let storage = pipeline.storage();

        let input = || NewFact {
            content: "TypeScript is the primary language used in this project".to_string(),
            subject: None,
            confidence: 1.0,
            source: None,
            tags: vec![],
            valid_from: None,
            valid_until: None,
        };

        let first = create_fact_checked(storage, &agent_id, input()).unwrap();
        let err = create_fact_checked(storage, &agent_id, input()).unwrap_err();
        match err {
            StoreError::Conflict {
                existing_id,
                similarity,
                ..
            } => {
                assert_eq!(existing_id.as_deref(), Some(first.id.as_str()));
                assert!(similarity.unwrap() >= crate::dedup::SYNTACTIC_THRESHOLD);
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn messages_to_ended_session_rejected() {
        let (_dir, pipeline, _agent_id, session) = pipeline();
        pipeline.add_message(&session.id, user_message("hello there, anyone?")).unwrap();

        let ended = pipeline.end_session(&session.id).unwrap();
        assert!(ended.is_ended());
        assert!(ended.summary.is_some());

        let err = pipeline
            .add_message(&session.id, user_message("too late now"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        let err = pipeline.end_session(&session.id).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn unknown_session_is_not_found() {
        let (_dir, pipeline, _agent_id, _session) = pipeline();
        let err = pipeline
            .add_message("no-such-session", user_message("hello out there"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
