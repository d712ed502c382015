//! Row structs for every persisted entity plus the input shapes accepted by
//! the write paths.
//!
//! Inputs that arrive as standalone JSON bodies use `deny_unknown_fields` so
//! malformed payloads fail loudly; item inputs stay permissive because the
//! server flattens them into agent-scoped envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::kind::{
    DecayStatus, EventSeverity, NodeKind, Permission, ProjectStatus, Relation, Role, TaskStatus,
};

// ============================================================================
// AGENTS & KEYS
// ============================================================================

/// A named principal owning a private memory namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub slug: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Arbitrary JSON tree editable by merge-patch.
    pub core_memory: Value,
    pub config: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewAgent {
    pub slug: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub core_memory: Option<Value>,
    #[serde(default)]
    pub config: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentPatch {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Option<Value>,
}

/// A persisted API key. The hash never serializes; the raw key exists only
/// in the creation response.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKey {
    pub id: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub permissions: Vec<Permission>,
    pub rate_limit: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }

    pub fn has_permission(&self, needed: Permission) -> bool {
        self.permissions.contains(&Permission::Admin) || self.permissions.contains(&needed)
    }
}

// ============================================================================
// SESSIONS & MESSAGES
// ============================================================================

/// An ordered sequence of role-tagged messages with an open/ended lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub metadata: Value,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Session {
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewSession {
    pub agent_id: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// A persisted session message. Immutable after insert.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMessage {
    pub id: String,
    pub session_id: String,
    pub agent_id: String,
    pub role: Role,
    pub content: String,
    pub metadata: Value,
    pub has_embedding: bool,
    pub decay_status: DecayStatus,
    pub access_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

// ============================================================================
// MEMORY ITEMS
// ============================================================================

/// A discrete piece of knowledge scoped to an agent.
#[derive(Debug, Clone, Serialize)]
pub struct Fact {
    pub id: String,
    pub agent_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub tags: Vec<String>,
    pub has_embedding: bool,
    pub valid_from: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    pub decay_status: DecayStatus,
    pub access_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFact {
    pub content: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

fn default_confidence() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FactPatch {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub superseded_by: Option<String>,
}

/// A recorded decision with its rationale and rejected alternatives.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub id: String,
    pub agent_id: String,
    pub title: String,
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub alternatives: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub tags: Vec<String>,
    pub has_embedding: bool,
    pub decay_status: DecayStatus,
    pub access_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDecision {
    pub title: String,
    pub decision: String,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The decision body is append-only; only annotations may change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionPatch {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// A unit of work with a free-transition status lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    pub tags: Vec<String>,
    pub has_embedding: bool,
    pub decay_status: DecayStatus,
    pub access_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub blocked_by: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_priority() -> i64 {
    50
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub blocked_by: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Something that happened, indexed by `occurred_at`.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<String>,
    pub severity: EventSeverity,
    pub tags: Vec<String>,
    pub has_embedding: bool,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub decay_status: DecayStatus,
    pub access_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub event_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub caused_by: Option<String>,
    #[serde(default)]
    pub severity: EventSeverity,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub severity: Option<EventSeverity>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// A grouping for tasks, decisions, and events. Slug is derived from the name.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: String,
    pub agent_id: String,
    pub slug: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub tags: Vec<String>,
    pub has_embedding: bool,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectPatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

// ============================================================================
// EDGES & POLICIES
// ============================================================================

/// A typed directed edge between two memory nodes. Endpoints are not
/// foreign-keyed; resolution must tolerate dangling references.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryEdge {
    pub id: String,
    pub agent_id: String,
    pub source_type: NodeKind,
    pub source_id: String,
    pub target_type: NodeKind,
    pub target_id: String,
    pub relation: Relation,
    pub weight: f64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewEdge {
    pub agent_id: String,
    pub source_type: NodeKind,
    pub source_id: String,
    pub target_type: NodeKind,
    pub target_id: String,
    pub relation: Relation,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub metadata: Option<Value>,
}

fn default_weight() -> f64 {
    1.0
}

/// Decay policy row; `agent_id = NULL` is the global default for the type.
#[derive(Debug, Clone, Serialize)]
pub struct DecayPolicy {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub memory_type: super::kind::MemoryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_days: Option<i64>,
    pub access_boost: f64,
    pub min_accesses: i64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fact_defaults() {
        let input: NewFact = serde_json::from_str(r#"{"content": "water is wet"}"#).unwrap();
        assert_eq!(input.confidence, 1.0);
        assert!(input.tags.is_empty());
        assert!(input.subject.is_none());
    }

    #[test]
    fn new_task_defaults() {
        let input: NewTask = serde_json::from_str(r#"{"title": "ship it"}"#).unwrap();
        assert_eq!(input.priority, 50);
        assert_eq!(input.status, TaskStatus::NotStarted);
    }

    #[test]
    fn inputs_deny_unknown_fields() {
        let result: Result<NewAgent, _> =
            serde_json::from_str(r#"{"slug": "a", "display_name": "A", "bogus": true}"#);
        assert!(result.is_err());

        let result: Result<NewEdge, _> = serde_json::from_str(
            r#"{"agent_id": "a", "source_type": "fact", "source_id": "1",
                "target_type": "task", "target_id": "2", "relation": "blocks",
                "surprise": 1}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn api_key_permission_checks() {
        let key = ApiKey {
            id: "k1".into(),
            key_hash: "h".into(),
            key_prefix: "hm_abcd".into(),
            name: "test".into(),
            agent_id: None,
            permissions: vec![Permission::Read],
            rate_limit: 100,
            expires_at: None,
            last_used_at: None,
            revoked_at: None,
            created_at: Utc::now(),
        };
        assert!(key.has_permission(Permission::Read));
        assert!(!key.has_permission(Permission::Write));
        assert!(!key.is_revoked());
        assert!(!key.is_expired(Utc::now()));
    }

    #[test]
    fn edge_default_weight() {
        let edge: NewEdge = serde_json::from_str(
            r#"{"agent_id": "a", "source_type": "fact", "source_id": "1",
                "target_type": "decision", "target_id": "2", "relation": "relates_to"}"#,
        )
        .unwrap();
        assert_eq!(edge.weight, 1.0);
    }
}
