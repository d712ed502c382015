//! Memory Model
//!
//! Typed memory items, the closed set of memory kinds, and the
//! input shapes accepted by the ingestion and direct-write paths.

mod kind;
mod model;
mod slug;

pub use kind::{
    DecayStatus, EventSeverity, MemoryKind, NodeKind, Permission, ProjectStatus, Relation, Role,
    TaskStatus,
};
pub use model::{
    Agent, AgentPatch, ApiKey, DecayPolicy, Decision, DecisionPatch, Event, EventPatch, Fact,
    FactPatch, MemoryEdge, NewAgent, NewDecision, NewEdge, NewEvent, NewFact, NewMessage,
    NewProject, NewSession, NewTask, Project, ProjectPatch, Session, SessionMessage, Task,
    TaskPatch,
};
pub use slug::{slugify, validate_slug};
