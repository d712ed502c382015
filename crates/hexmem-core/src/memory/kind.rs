//! The closed set of memory kinds and the small enums shared across tables.
//!
//! `MemoryKind` doubles as a value table: the recall planner, the dedup
//! detector, and the decay engine all iterate `MemoryKind::ALL` and ask it
//! for the backing table, the canonical content expression, and the time
//! column instead of dispatching on strings.

use serde::{Deserialize, Serialize};

// ============================================================================
// MEMORY KINDS
// ============================================================================

/// The closed set of recallable memory item kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    SessionMessage,
    Fact,
    Decision,
    Task,
    Event,
}

impl MemoryKind {
    /// Every kind, in the order the recall planner fans out.
    pub const ALL: [MemoryKind; 5] = [
        MemoryKind::SessionMessage,
        MemoryKind::Fact,
        MemoryKind::Decision,
        MemoryKind::Task,
        MemoryKind::Event,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryKind::SessionMessage => "session_message",
            MemoryKind::Fact => "fact",
            MemoryKind::Decision => "decision",
            MemoryKind::Task => "task",
            MemoryKind::Event => "event",
        }
    }

    /// Parse from a wire name; accepts the singular form used in `types` filters.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "session_message" | "message" => Some(MemoryKind::SessionMessage),
            "fact" => Some(MemoryKind::Fact),
            "decision" => Some(MemoryKind::Decision),
            "task" => Some(MemoryKind::Task),
            "event" => Some(MemoryKind::Event),
            _ => None,
        }
    }

    /// Backing table name.
    pub fn table(self) -> &'static str {
        match self {
            MemoryKind::SessionMessage => "session_messages",
            MemoryKind::Fact => "facts",
            MemoryKind::Decision => "decisions",
            MemoryKind::Task => "tasks",
            MemoryKind::Event => "events",
        }
    }

    /// SQL expression producing the canonical content of a row.
    ///
    /// The same text is embedded at write time and matched by the lexical
    /// arm and the syntactic dedup stage, so the three stay in agreement.
    pub fn content_expr(self) -> &'static str {
        match self {
            MemoryKind::SessionMessage => "content",
            MemoryKind::Fact => "content",
            MemoryKind::Decision => "title || ': ' || decision",
            MemoryKind::Task => "title",
            MemoryKind::Event => "title",
        }
    }

    /// Column carrying the item's position on the timeline (recency, decay).
    pub fn time_column(self) -> &'static str {
        match self {
            MemoryKind::Event => "occurred_at",
            _ => "created_at",
        }
    }

    /// Relation used for the derivation edge back to the originating session.
    pub fn derivation_relation(self) -> Relation {
        match self {
            MemoryKind::Decision => Relation::DecidedIn,
            _ => Relation::DerivedFrom,
        }
    }

    /// Whether direct writes to this kind run the near-duplicate detector.
    pub fn dedups(self) -> bool {
        !matches!(self, MemoryKind::SessionMessage)
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// GRAPH NODE KINDS
// ============================================================================

/// Everything an edge endpoint can point at. A superset of [`MemoryKind`]:
/// sessions and projects participate in the graph but not in recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    SessionMessage,
    Fact,
    Decision,
    Task,
    Event,
    Project,
    Session,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::SessionMessage => "session_message",
            NodeKind::Fact => "fact",
            NodeKind::Decision => "decision",
            NodeKind::Task => "task",
            NodeKind::Event => "event",
            NodeKind::Project => "project",
            NodeKind::Session => "session",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "session_message" | "message" => Some(NodeKind::SessionMessage),
            "fact" => Some(NodeKind::Fact),
            "decision" => Some(NodeKind::Decision),
            "task" => Some(NodeKind::Task),
            "event" => Some(NodeKind::Event),
            "project" => Some(NodeKind::Project),
            "session" => Some(NodeKind::Session),
            _ => None,
        }
    }

    /// The recall kind, when this node kind is recallable.
    pub fn memory_kind(self) -> Option<MemoryKind> {
        match self {
            NodeKind::SessionMessage => Some(MemoryKind::SessionMessage),
            NodeKind::Fact => Some(MemoryKind::Fact),
            NodeKind::Decision => Some(MemoryKind::Decision),
            NodeKind::Task => Some(MemoryKind::Task),
            NodeKind::Event => Some(MemoryKind::Event),
            NodeKind::Project | NodeKind::Session => None,
        }
    }
}

impl From<MemoryKind> for NodeKind {
    fn from(kind: MemoryKind) -> Self {
        match kind {
            MemoryKind::SessionMessage => NodeKind::SessionMessage,
            MemoryKind::Fact => NodeKind::Fact,
            MemoryKind::Decision => NodeKind::Decision,
            MemoryKind::Task => NodeKind::Task,
            MemoryKind::Event => NodeKind::Event,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SHARED ENUMS
// ============================================================================

/// Decay lifecycle state shared by every memory table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayStatus {
    #[default]
    Active,
    Cooling,
    Archived,
}

impl DecayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DecayStatus::Active => "active",
            DecayStatus::Cooling => "cooling",
            DecayStatus::Archived => "archived",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "active" => Some(DecayStatus::Active),
            "cooling" => Some(DecayStatus::Cooling),
            "archived" => Some(DecayStatus::Archived),
            _ => None,
        }
    }
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

/// Task lifecycle status. Transitions are free-form; only the enum is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Blocked,
    Complete,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Complete => "complete",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(TaskStatus::NotStarted),
            "in_progress" => Some(TaskStatus::InProgress),
            "blocked" => Some(TaskStatus::Blocked),
            "complete" => Some(TaskStatus::Complete),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl EventSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            EventSeverity::Info => "info",
            EventSeverity::Warning => "warning",
            EventSeverity::Critical => "critical",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "info" => Some(EventSeverity::Info),
            "warning" => Some(EventSeverity::Warning),
            "critical" => Some(EventSeverity::Critical),
            _ => None,
        }
    }
}

/// Project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Active,
    Paused,
    Completed,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Archived => "archived",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ProjectStatus::Active),
            "paused" => Some(ProjectStatus::Paused),
            "completed" => Some(ProjectStatus::Completed),
            "archived" => Some(ProjectStatus::Archived),
            _ => None,
        }
    }
}

/// Typed edge relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    CausedBy,
    DecidedIn,
    Blocks,
    RelatesTo,
    Supersedes,
    PartOf,
    LedTo,
    References,
    DependsOn,
    DerivedFrom,
}

impl Relation {
    pub fn as_str(self) -> &'static str {
        match self {
            Relation::CausedBy => "caused_by",
            Relation::DecidedIn => "decided_in",
            Relation::Blocks => "blocks",
            Relation::RelatesTo => "relates_to",
            Relation::Supersedes => "supersedes",
            Relation::PartOf => "part_of",
            Relation::LedTo => "led_to",
            Relation::References => "references",
            Relation::DependsOn => "depends_on",
            Relation::DerivedFrom => "derived_from",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "caused_by" => Some(Relation::CausedBy),
            "decided_in" => Some(Relation::DecidedIn),
            "blocks" => Some(Relation::Blocks),
            "relates_to" => Some(Relation::RelatesTo),
            "supersedes" => Some(Relation::Supersedes),
            "part_of" => Some(Relation::PartOf),
            "led_to" => Some(Relation::LedTo),
            "references" => Some(Relation::References),
            "depends_on" => Some(Relation::DependsOn),
            "derived_from" => Some(Relation::DerivedFrom),
            _ => None,
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// API key permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Admin,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Admin => "admin",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Permission::Read),
            "write" => Some(Permission::Write),
            "admin" => Some(Permission::Admin),
            _ => None,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_kind_roundtrip() {
        for kind in MemoryKind::ALL {
            assert_eq!(MemoryKind::parse_name(kind.as_str()), Some(kind));
        }
        assert_eq!(MemoryKind::parse_name("nonsense"), None);
    }

    #[test]
    fn value_table_is_consistent() {
        assert_eq!(MemoryKind::Event.time_column(), "occurred_at");
        assert_eq!(MemoryKind::Fact.time_column(), "created_at");
        assert_eq!(MemoryKind::Decision.content_expr(), "title || ': ' || decision");
        assert!(!MemoryKind::SessionMessage.dedups());
        assert!(MemoryKind::Fact.dedups());
    }

    #[test]
    fn derivation_relation_per_kind() {
        assert_eq!(MemoryKind::Decision.derivation_relation(), Relation::DecidedIn);
        assert_eq!(MemoryKind::Fact.derivation_relation(), Relation::DerivedFrom);
        assert_eq!(MemoryKind::Task.derivation_relation(), Relation::DerivedFrom);
    }

    #[test]
    fn node_kind_superset() {
        assert_eq!(NodeKind::Project.memory_kind(), None);
        assert_eq!(NodeKind::Fact.memory_kind(), Some(MemoryKind::Fact));
        assert_eq!(NodeKind::from(MemoryKind::Event), NodeKind::Event);
    }

    #[test]
    fn relation_parse() {
        assert_eq!(Relation::parse_name("relates_to"), Some(Relation::RelatesTo));
        assert_eq!(Relation::parse_name("unknown"), None);
    }
}
