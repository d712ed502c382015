//! CRUD over the typed memory tables (facts, decisions, tasks, events,
//! projects) plus total node resolution for the graph and recall expansion.
//!
//! Embedding happens here, once, from the canonical text of each kind; the
//! same text the lexical arm and the dedup detector match against.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::memory::{
    slugify, DecayStatus, Decision, DecisionPatch, Event, EventPatch, EventSeverity, Fact,
    FactPatch, MemoryKind, NewDecision, NewEvent, NewFact, NewProject, NewTask, NodeKind, Project,
    ProjectPatch, ProjectStatus, Task, TaskPatch, TaskStatus,
};

use super::sqlite::{Result, Storage, StoreError};

/// A resolved graph node: enough to render an edge endpoint or a related
/// recall result without loading the full typed row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub content: String,
    pub metadata: Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Common list filter for the typed CRUD endpoints.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub agent: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<i64>,
}

impl ListFilter {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 500)
    }
}

impl Storage {
    fn resolve_filter_agent(&self, filter: &ListFilter) -> Result<Option<String>> {
        match &filter.agent {
            Some(a) => Ok(Some(self.resolve_agent_id(a)?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // FACTS
    // ========================================================================

    pub(crate) fn row_to_fact(row: &rusqlite::Row) -> rusqlite::Result<Fact> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let valid_from: String = row.get("valid_from")?;
        let decay_status: String = row.get("decay_status")?;
        let embedding: Option<Vec<u8>> = row.get("embedding")?;
        Ok(Fact {
            id: row.get("id")?,
            agent_id: row.get("agent_id")?,
            content: row.get("content")?,
            subject: row.get("subject")?,
            confidence: row.get("confidence")?,
            source: row.get("source")?,
            tags: Self::tags_from_json(row.get("tags")?),
            has_embedding: embedding.is_some(),
            valid_from: Self::parse_timestamp(&valid_from, "valid_from")?,
            valid_until: Self::opt_timestamp(row.get("valid_until")?),
            superseded_by: row.get("superseded_by")?,
            decay_status: DecayStatus::parse_name(&decay_status).unwrap_or_default(),
            access_count: row.get("access_count")?,
            last_accessed_at: Self::opt_timestamp(row.get("last_accessed_at")?),
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
        })
    }

    pub fn insert_fact(&self, agent_id: &str, input: &NewFact) -> Result<Fact> {
        if input.content.trim().is_empty() {
            return Err(StoreError::InvalidArgument("content is required".to_string()));
        }
        if !(0.0..=1.0).contains(&input.confidence) {
            return Err(StoreError::InvalidArgument(
                "confidence must be within [0, 1]".to_string(),
            ));
        }

        let now = Utc::now();
        let embedding = self.try_embed(&input.content);
        let fact = Fact {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            content: input.content.clone(),
            subject: input.subject.clone(),
            confidence: input.confidence,
            source: input.source.clone(),
            tags: input.tags.clone(),
            has_embedding: embedding.is_some(),
            valid_from: input.valid_from.unwrap_or(now),
            valid_until: input.valid_until,
            superseded_by: None,
            decay_status: DecayStatus::Active,
            access_count: 0,
            last_accessed_at: None,
            created_at: now,
            updated_at: now,
        };

        let writer = self.lock_writer()?;
        writer.execute(
            "INSERT INTO facts (id, agent_id, content, subject, confidence, source, tags, embedding,
                                valid_from, valid_until, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                fact.id,
                fact.agent_id,
                fact.content,
                fact.subject,
                fact.confidence,
                fact.source,
                serde_json::to_string(&fact.tags)?,
                embedding,
                fact.valid_from.to_rfc3339(),
                fact.valid_until.map(|t| t.to_rfc3339()),
                now.to_rfc3339(),
            ],
        )?;

        Ok(fact)
    }

    pub fn get_fact(&self, id: &str) -> Result<Fact> {
        let reader = self.lock_reader()?;
        reader
            .query_row("SELECT * FROM facts WHERE id = ?1", params![id], Self::row_to_fact)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("fact '{}'", id)))
    }

    pub fn list_facts(&self, filter: &ListFilter) -> Result<Vec<Fact>> {
        self.list_rows("facts", filter, Self::row_to_fact)
    }

    /// Mutable content re-embeds; everything else is a plain column update.
    pub fn update_fact(&self, id: &str, patch: FactPatch) -> Result<Fact> {
        let mut fact = self.get_fact(id)?;

        let content_changed = patch
            .content
            .as_ref()
            .is_some_and(|c| *c != fact.content);
        if let Some(content) = patch.content {
            fact.content = content;
        }
        if let Some(subject) = patch.subject {
            fact.subject = Some(subject);
        }
        if let Some(confidence) = patch.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(StoreError::InvalidArgument(
                    "confidence must be within [0, 1]".to_string(),
                ));
            }
            fact.confidence = confidence;
        }
        if let Some(source) = patch.source {
            fact.source = Some(source);
        }
        if let Some(tags) = patch.tags {
            fact.tags = tags;
        }
        if let Some(valid_until) = patch.valid_until {
            fact.valid_until = Some(valid_until);
        }
        if let Some(superseded_by) = patch.superseded_by {
            fact.superseded_by = Some(superseded_by);
        }
        fact.updated_at = Utc::now();

        let embedding = if content_changed {
            let e = self.try_embed(&fact.content);
            fact.has_embedding = e.is_some();
            Some(e)
        } else {
            None
        };

        let writer = self.lock_writer()?;
        match embedding {
            Some(embedding) => {
                writer.execute(
                    "UPDATE facts SET content = ?1, subject = ?2, confidence = ?3, source = ?4,
                                      tags = ?5, valid_until = ?6, superseded_by = ?7,
                                      embedding = ?8, updated_at = ?9
                     WHERE id = ?10",
                    params![
                        fact.content,
                        fact.subject,
                        fact.confidence,
                        fact.source,
                        serde_json::to_string(&fact.tags)?,
                        fact.valid_until.map(|t| t.to_rfc3339()),
                        fact.superseded_by,
                        embedding,
                        fact.updated_at.to_rfc3339(),
                        fact.id,
                    ],
                )?;
            }
            None => {
                writer.execute(
                    "UPDATE facts SET content = ?1, subject = ?2, confidence = ?3, source = ?4,
                                      tags = ?5, valid_until = ?6, superseded_by = ?7, updated_at = ?8
                     WHERE id = ?9",
                    params![
                        fact.content,
                        fact.subject,
                        fact.confidence,
                        fact.source,
                        serde_json::to_string(&fact.tags)?,
                        fact.valid_until.map(|t| t.to_rfc3339()),
                        fact.superseded_by,
                        fact.updated_at.to_rfc3339(),
                        fact.id,
                    ],
                )?;
            }
        }

        Ok(fact)
    }

    // ========================================================================
    // DECISIONS
    // ========================================================================

    pub(crate) fn row_to_decision(row: &rusqlite::Row) -> rusqlite::Result<Decision> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let decay_status: String = row.get("decay_status")?;
        let alternatives: String = row.get("alternatives")?;
        let embedding: Option<Vec<u8>> = row.get("embedding")?;
        Ok(Decision {
            id: row.get("id")?,
            agent_id: row.get("agent_id")?,
            title: row.get("title")?,
            decision: row.get("decision")?,
            rationale: row.get("rationale")?,
            alternatives: serde_json::from_str(&alternatives).unwrap_or_default(),
            context: row.get("context")?,
            session_id: row.get("session_id")?,
            tags: Self::tags_from_json(row.get("tags")?),
            has_embedding: embedding.is_some(),
            decay_status: DecayStatus::parse_name(&decay_status).unwrap_or_default(),
            access_count: row.get("access_count")?,
            last_accessed_at: Self::opt_timestamp(row.get("last_accessed_at")?),
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
        })
    }

    pub fn insert_decision(&self, agent_id: &str, input: &NewDecision) -> Result<Decision> {
        if input.title.trim().is_empty() || input.decision.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "title and decision are required".to_string(),
            ));
        }

        let now = Utc::now();
        let canonical = format!("{}: {}", input.title, input.decision);
        let embedding = self.try_embed(&canonical);
        let decision = Decision {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            title: input.title.clone(),
            decision: input.decision.clone(),
            rationale: input.rationale.clone(),
            alternatives: input.alternatives.clone(),
            context: input.context.clone(),
            session_id: input.session_id.clone(),
            tags: input.tags.clone(),
            has_embedding: embedding.is_some(),
            decay_status: DecayStatus::Active,
            access_count: 0,
            last_accessed_at: None,
            created_at: now,
            updated_at: now,
        };

        let writer = self.lock_writer()?;
        writer.execute(
            "INSERT INTO decisions (id, agent_id, title, decision, rationale, alternatives, context,
                                    session_id, tags, embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                decision.id,
                decision.agent_id,
                decision.title,
                decision.decision,
                decision.rationale,
                serde_json::to_string(&decision.alternatives)?,
                decision.context,
                decision.session_id,
                serde_json::to_string(&decision.tags)?,
                embedding,
                now.to_rfc3339(),
            ],
        )?;

        Ok(decision)
    }

    pub fn get_decision(&self, id: &str) -> Result<Decision> {
        let reader = self.lock_reader()?;
        reader
            .query_row(
                "SELECT * FROM decisions WHERE id = ?1",
                params![id],
                Self::row_to_decision,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("decision '{}'", id)))
    }

    pub fn list_decisions(&self, filter: &ListFilter) -> Result<Vec<Decision>> {
        self.list_rows("decisions", filter, Self::row_to_decision)
    }

    /// The decision body is append-only; only annotations change.
    pub fn update_decision(&self, id: &str, patch: DecisionPatch) -> Result<Decision> {
        let mut decision = self.get_decision(id)?;
        if let Some(context) = patch.context {
            decision.context = Some(context);
        }
        if let Some(tags) = patch.tags {
            decision.tags = tags;
        }
        decision.updated_at = Utc::now();

        let writer = self.lock_writer()?;
        writer.execute(
            "UPDATE decisions SET context = ?1, tags = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                decision.context,
                serde_json::to_string(&decision.tags)?,
                decision.updated_at.to_rfc3339(),
                decision.id,
            ],
        )?;

        Ok(decision)
    }

    // ========================================================================
    // TASKS
    // ========================================================================

    pub(crate) fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let decay_status: String = row.get("decay_status")?;
        let status: String = row.get("status")?;
        let embedding: Option<Vec<u8>> = row.get("embedding")?;
        Ok(Task {
            id: row.get("id")?,
            agent_id: row.get("agent_id")?,
            project_id: row.get("project_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            status: TaskStatus::parse_name(&status).unwrap_or_default(),
            priority: row.get("priority")?,
            assignee: row.get("assignee")?,
            due_date: Self::opt_timestamp(row.get("due_date")?),
            blocked_by: row.get("blocked_by")?,
            tags: Self::tags_from_json(row.get("tags")?),
            has_embedding: embedding.is_some(),
            decay_status: DecayStatus::parse_name(&decay_status).unwrap_or_default(),
            access_count: row.get("access_count")?,
            last_accessed_at: Self::opt_timestamp(row.get("last_accessed_at")?),
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
        })
    }

    pub fn insert_task(&self, agent_id: &str, input: &NewTask) -> Result<Task> {
        if input.title.trim().is_empty() {
            return Err(StoreError::InvalidArgument("title is required".to_string()));
        }
        if !(1..=100).contains(&input.priority) {
            return Err(StoreError::InvalidArgument(
                "priority must be within [1, 100]".to_string(),
            ));
        }

        let now = Utc::now();
        let embedding = self.try_embed(&input.title);
        let task = Task {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            project_id: input.project_id.clone(),
            title: input.title.clone(),
            description: input.description.clone(),
            status: input.status,
            priority: input.priority,
            assignee: input.assignee.clone(),
            due_date: input.due_date,
            blocked_by: input.blocked_by.clone(),
            tags: input.tags.clone(),
            has_embedding: embedding.is_some(),
            decay_status: DecayStatus::Active,
            access_count: 0,
            last_accessed_at: None,
            created_at: now,
            updated_at: now,
        };

        let writer = self.lock_writer()?;
        writer.execute(
            "INSERT INTO tasks (id, agent_id, project_id, title, description, status, priority,
                                assignee, due_date, blocked_by, tags, embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                task.id,
                task.agent_id,
                task.project_id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority,
                task.assignee,
                task.due_date.map(|t| t.to_rfc3339()),
                task.blocked_by,
                serde_json::to_string(&task.tags)?,
                embedding,
                now.to_rfc3339(),
            ],
        )?;

        Ok(task)
    }

    pub fn get_task(&self, id: &str) -> Result<Task> {
        let reader = self.lock_reader()?;
        reader
            .query_row("SELECT * FROM tasks WHERE id = ?1", params![id], Self::row_to_task)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("task '{}'", id)))
    }

    pub fn list_tasks(&self, filter: &ListFilter) -> Result<Vec<Task>> {
        self.list_rows("tasks", filter, Self::row_to_task)
    }

    pub fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        let mut task = self.get_task(id)?;

        let title_changed = patch.title.as_ref().is_some_and(|t| *t != task.title);
        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = Some(description);
        }
        if let Some(project_id) = patch.project_id {
            task.project_id = Some(project_id);
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(priority) = patch.priority {
            if !(1..=100).contains(&priority) {
                return Err(StoreError::InvalidArgument(
                    "priority must be within [1, 100]".to_string(),
                ));
            }
            task.priority = priority;
        }
        if let Some(assignee) = patch.assignee {
            task.assignee = Some(assignee);
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(blocked_by) = patch.blocked_by {
            task.blocked_by = Some(blocked_by);
        }
        if let Some(tags) = patch.tags {
            task.tags = tags;
        }
        task.updated_at = Utc::now();

        let embedding = if title_changed {
            let e = self.try_embed(&task.title);
            task.has_embedding = e.is_some();
            Some(e)
        } else {
            None
        };

        let writer = self.lock_writer()?;
        match embedding {
            Some(embedding) => {
                writer.execute(
                    "UPDATE tasks SET project_id = ?1, title = ?2, description = ?3, status = ?4,
                                      priority = ?5, assignee = ?6, due_date = ?7, blocked_by = ?8,
                                      tags = ?9, embedding = ?10, updated_at = ?11
                     WHERE id = ?12",
                    params![
                        task.project_id,
                        task.title,
                        task.description,
                        task.status.as_str(),
                        task.priority,
                        task.assignee,
                        task.due_date.map(|t| t.to_rfc3339()),
                        task.blocked_by,
                        serde_json::to_string(&task.tags)?,
                        embedding,
                        task.updated_at.to_rfc3339(),
                        task.id,
                    ],
                )?;
            }
            None => {
                writer.execute(
                    "UPDATE tasks SET project_id = ?1, title = ?2, description = ?3, status = ?4,
                                      priority = ?5, assignee = ?6, due_date = ?7, blocked_by = ?8,
                                      tags = ?9, updated_at = ?10
                     WHERE id = ?11",
                    params![
                        task.project_id,
                        task.title,
                        task.description,
                        task.status.as_str(),
                        task.priority,
                        task.assignee,
                        task.due_date.map(|t| t.to_rfc3339()),
                        task.blocked_by,
                        serde_json::to_string(&task.tags)?,
                        task.updated_at.to_rfc3339(),
                        task.id,
                    ],
                )?;
            }
        }

        Ok(task)
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    pub(crate) fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let occurred_at: String = row.get("occurred_at")?;
        let decay_status: String = row.get("decay_status")?;
        let severity: String = row.get("severity")?;
        let embedding: Option<Vec<u8>> = row.get("embedding")?;
        Ok(Event {
            id: row.get("id")?,
            agent_id: row.get("agent_id")?,
            project_id: row.get("project_id")?,
            title: row.get("title")?,
            event_type: row.get("event_type")?,
            description: row.get("description")?,
            outcome: row.get("outcome")?,
            caused_by: row.get("caused_by")?,
            severity: EventSeverity::parse_name(&severity).unwrap_or_default(),
            tags: Self::tags_from_json(row.get("tags")?),
            has_embedding: embedding.is_some(),
            occurred_at: Self::parse_timestamp(&occurred_at, "occurred_at")?,
            resolved_at: Self::opt_timestamp(row.get("resolved_at")?),
            decay_status: DecayStatus::parse_name(&decay_status).unwrap_or_default(),
            access_count: row.get("access_count")?,
            last_accessed_at: Self::opt_timestamp(row.get("last_accessed_at")?),
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
        })
    }

    pub fn insert_event(&self, agent_id: &str, input: &NewEvent) -> Result<Event> {
        if input.title.trim().is_empty() || input.event_type.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "title and event_type are required".to_string(),
            ));
        }

        let now = Utc::now();
        let embedding = self.try_embed(&input.title);
        let event = Event {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            project_id: input.project_id.clone(),
            title: input.title.clone(),
            event_type: input.event_type.clone(),
            description: input.description.clone(),
            outcome: input.outcome.clone(),
            caused_by: input.caused_by.clone(),
            severity: input.severity,
            tags: input.tags.clone(),
            has_embedding: embedding.is_some(),
            occurred_at: input.occurred_at.unwrap_or(now),
            resolved_at: input.resolved_at,
            decay_status: DecayStatus::Active,
            access_count: 0,
            last_accessed_at: None,
            created_at: now,
            updated_at: now,
        };

        let writer = self.lock_writer()?;
        writer.execute(
            "INSERT INTO events (id, agent_id, project_id, title, event_type, description, outcome,
                                 caused_by, severity, tags, embedding, occurred_at, resolved_at,
                                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
            params![
                event.id,
                event.agent_id,
                event.project_id,
                event.title,
                event.event_type,
                event.description,
                event.outcome,
                event.caused_by,
                event.severity.as_str(),
                serde_json::to_string(&event.tags)?,
                embedding,
                event.occurred_at.to_rfc3339(),
                event.resolved_at.map(|t| t.to_rfc3339()),
                now.to_rfc3339(),
            ],
        )?;

        Ok(event)
    }

    pub fn get_event(&self, id: &str) -> Result<Event> {
        let reader = self.lock_reader()?;
        reader
            .query_row("SELECT * FROM events WHERE id = ?1", params![id], Self::row_to_event)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("event '{}'", id)))
    }

    pub fn list_events(&self, filter: &ListFilter) -> Result<Vec<Event>> {
        self.list_rows("events", filter, Self::row_to_event)
    }

    pub fn update_event(&self, id: &str, patch: EventPatch) -> Result<Event> {
        let mut event = self.get_event(id)?;
        if let Some(description) = patch.description {
            event.description = Some(description);
        }
        if let Some(outcome) = patch.outcome {
            event.outcome = Some(outcome);
        }
        if let Some(severity) = patch.severity {
            event.severity = severity;
        }
        if let Some(resolved_at) = patch.resolved_at {
            event.resolved_at = Some(resolved_at);
        }
        if let Some(tags) = patch.tags {
            event.tags = tags;
        }
        event.updated_at = Utc::now();

        let writer = self.lock_writer()?;
        writer.execute(
            "UPDATE events SET description = ?1, outcome = ?2, severity = ?3, resolved_at = ?4,
                               tags = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                event.description,
                event.outcome,
                event.severity.as_str(),
                event.resolved_at.map(|t| t.to_rfc3339()),
                serde_json::to_string(&event.tags)?,
                event.updated_at.to_rfc3339(),
                event.id,
            ],
        )?;

        Ok(event)
    }

    // ========================================================================
    // PROJECTS
    // ========================================================================

    pub(crate) fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let status: String = row.get("status")?;
        let embedding: Option<Vec<u8>> = row.get("embedding")?;
        Ok(Project {
            id: row.get("id")?,
            agent_id: row.get("agent_id")?,
            slug: row.get("slug")?,
            name: row.get("name")?,
            description: row.get("description")?,
            status: ProjectStatus::parse_name(&status).unwrap_or_default(),
            tags: Self::tags_from_json(row.get("tags")?),
            has_embedding: embedding.is_some(),
            metadata: Self::json_or_default(row.get("metadata")?),
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
        })
    }

    /// Slug derives from the name; a per-agent collision is a conflict.
    pub fn insert_project(&self, agent_id: &str, input: &NewProject) -> Result<Project> {
        if input.name.trim().is_empty() {
            return Err(StoreError::InvalidArgument("name is required".to_string()));
        }
        let slug = slugify(&input.name);
        if slug.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "name '{}' does not yield a usable slug",
                input.name
            )));
        }

        let now = Utc::now();
        let embedding = self.try_embed(&input.name);
        let project = Project {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            slug: slug.clone(),
            name: input.name.clone(),
            description: input.description.clone(),
            status: input.status,
            tags: input.tags.clone(),
            has_embedding: embedding.is_some(),
            metadata: input
                .metadata
                .clone()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            created_at: now,
            updated_at: now,
        };

        let writer = self.lock_writer()?;
        let inserted = writer.execute(
            "INSERT INTO projects (id, agent_id, slug, name, description, status, tags, embedding,
                                   metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(agent_id, slug) DO NOTHING",
            params![
                project.id,
                project.agent_id,
                project.slug,
                project.name,
                project.description,
                project.status.as_str(),
                serde_json::to_string(&project.tags)?,
                embedding,
                serde_json::to_string(&project.metadata)?,
                now.to_rfc3339(),
            ],
        )?;

        if inserted == 0 {
            let existing_id: Option<String> = writer
                .query_row(
                    "SELECT id FROM projects WHERE agent_id = ?1 AND slug = ?2",
                    params![agent_id, slug],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(StoreError::Conflict {
                message: format!("project slug '{}' already exists for this agent", slug),
                existing_id,
                similarity: None,
            });
        }

        Ok(project)
    }

    pub fn get_project(&self, id: &str) -> Result<Project> {
        let reader = self.lock_reader()?;
        reader
            .query_row(
                "SELECT * FROM projects WHERE id = ?1",
                params![id],
                Self::row_to_project,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("project '{}'", id)))
    }

    pub fn list_projects(&self, filter: &ListFilter) -> Result<Vec<Project>> {
        self.list_rows("projects", filter, Self::row_to_project)
    }

    pub fn update_project(&self, id: &str, patch: ProjectPatch) -> Result<Project> {
        let mut project = self.get_project(id)?;
        if let Some(description) = patch.description {
            project.description = Some(description);
        }
        if let Some(status) = patch.status {
            project.status = status;
        }
        if let Some(tags) = patch.tags {
            project.tags = tags;
        }
        if let Some(metadata) = patch.metadata {
            project.metadata = metadata;
        }
        project.updated_at = Utc::now();

        let writer = self.lock_writer()?;
        writer.execute(
            "UPDATE projects SET description = ?1, status = ?2, tags = ?3, metadata = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                project.description,
                project.status.as_str(),
                serde_json::to_string(&project.tags)?,
                serde_json::to_string(&project.metadata)?,
                project.updated_at.to_rfc3339(),
                project.id,
            ],
        )?;

        Ok(project)
    }

    // ========================================================================
    // SHARED
    // ========================================================================

    fn list_rows<T>(
        &self,
        table: &str,
        filter: &ListFilter,
        map: fn(&rusqlite::Row) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let agent_id = self.resolve_filter_agent(filter)?;
        let order = if table == "events" { "occurred_at" } else { "created_at" };

        let mut sql = format!("SELECT * FROM {} WHERE 1=1", table);
        let mut bindings: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(agent_id) = agent_id {
            bindings.push(Box::new(agent_id));
            sql.push_str(&format!(" AND agent_id = ?{}", bindings.len()));
        }
        if let Some(tag) = &filter.tag {
            // tags are stored as a JSON array of strings
            bindings.push(Box::new(format!("\"{}\"", tag)));
            sql.push_str(&format!(" AND instr(tags, ?{}) > 0", bindings.len()));
        }
        bindings.push(Box::new(filter.limit()));
        sql.push_str(&format!(" ORDER BY {} DESC LIMIT ?{}", order, bindings.len()));

        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let params = rusqlite::params_from_iter(bindings.iter().map(|b| b.as_ref()));
        let rows = stmt
            .query_map(params, map)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete a row of any memory kind or project. Returns whether it existed.
    pub fn delete_node(&self, kind: NodeKind, id: &str) -> Result<bool> {
        let table = match kind {
            NodeKind::Project => "projects",
            NodeKind::Session => {
                return Err(StoreError::InvalidArgument(
                    "sessions cannot be deleted".to_string(),
                ))
            }
            other => other
                .memory_kind()
                .map(MemoryKind::table)
                .expect("memory kinds map to tables"),
        };
        let sql = format!("DELETE FROM {} WHERE id = ?1", table);
        let writer = self.lock_writer()?;
        Ok(writer.execute(&sql, params![id])? > 0)
    }

    /// Total node resolution for graph views and recall expansion: unknown
    /// ids resolve to `None` instead of erroring, so dangling edges are
    /// skipped gracefully.
    pub fn fetch_node_summary(&self, kind: NodeKind, id: &str) -> Result<Option<NodeSummary>> {
        let summary = match kind {
            NodeKind::SessionMessage => {
                let reader = self.lock_reader()?;
                reader
                    .query_row(
                        "SELECT * FROM session_messages WHERE id = ?1",
                        params![id],
                        Self::row_to_message,
                    )
                    .optional()?
                    .map(|m| NodeSummary {
                        id: m.id,
                        kind,
                        content: m.content,
                        metadata: json!({ "role": m.role }),
                        created_at: m.created_at,
                    })
            }
            NodeKind::Fact => self.try_get(id, Self::row_to_fact, "facts")?.map(|f| NodeSummary {
                id: f.id,
                kind,
                content: f.content,
                metadata: json!({ "subject": f.subject, "tags": f.tags }),
                created_at: f.created_at,
            }),
            NodeKind::Decision => {
                self.try_get(id, Self::row_to_decision, "decisions")?
                    .map(|d| NodeSummary {
                        id: d.id.clone(),
                        kind,
                        content: format!("{}: {}", d.title, d.decision),
                        metadata: json!({ "tags": d.tags }),
                        created_at: d.created_at,
                    })
            }
            NodeKind::Task => self.try_get(id, Self::row_to_task, "tasks")?.map(|t| NodeSummary {
                id: t.id,
                kind,
                content: t.title,
                metadata: json!({ "status": t.status, "priority": t.priority }),
                created_at: t.created_at,
            }),
            NodeKind::Event => self.try_get(id, Self::row_to_event, "events")?.map(|e| NodeSummary {
                id: e.id,
                kind,
                content: e.title,
                metadata: json!({ "event_type": e.event_type, "severity": e.severity }),
                created_at: e.created_at,
            }),
            NodeKind::Project => {
                self.try_get(id, Self::row_to_project, "projects")?
                    .map(|p| NodeSummary {
                        id: p.id,
                        kind,
                        content: p.name,
                        metadata: json!({ "slug": p.slug, "status": p.status }),
                        created_at: p.created_at,
                    })
            }
            NodeKind::Session => {
                let reader = self.lock_reader()?;
                reader
                    .query_row(
                        "SELECT * FROM sessions WHERE id = ?1",
                        params![id],
                        Self::row_to_session,
                    )
                    .optional()?
                    .map(|s| NodeSummary {
                        id: s.id,
                        kind,
                        content: s.summary.unwrap_or_default(),
                        metadata: json!({ "external_id": s.external_id }),
                        created_at: s.started_at,
                    })
            }
        };
        Ok(summary)
    }

    fn try_get<T>(
        &self,
        id: &str,
        map: fn(&rusqlite::Row) -> rusqlite::Result<T>,
        table: &str,
    ) -> Result<Option<T>> {
        let reader = self.lock_reader()?;
        let sql = format!("SELECT * FROM {} WHERE id = ?1", table);
        Ok(reader.query_row(&sql, params![id], map).optional()?)
    }
}

// ============================================================================
// TESTS
// ============================================================================
