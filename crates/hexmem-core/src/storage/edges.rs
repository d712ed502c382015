//! The typed edge graph.
//!
//! Upserts are idempotent on the five-tuple `(source_type, source_id,
//! target_type, target_id, relation)`: a repeat insert keeps the original id
//! and refreshes weight and metadata. Endpoints are not foreign keys, so
//! readers must tolerate dangling references.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::memory::{MemoryEdge, NewEdge, NodeKind, Relation};

use super::sqlite::{Result, Storage, StoreError};

/// Filter for edge listing; any subset of fields may be set.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    pub agent: Option<String>,
    pub source_type: Option<NodeKind>,
    pub source_id: Option<String>,
    pub target_type: Option<NodeKind>,
    pub target_id: Option<String>,
    pub relation: Option<Relation>,
    pub limit: Option<i64>,
}

impl Storage {
    pub(crate) fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<MemoryEdge> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let source_type: String = row.get("source_type")?;
        let target_type: String = row.get("target_type")?;
        let relation: String = row.get("relation")?;
        Ok(MemoryEdge {
            id: row.get("id")?,
            agent_id: row.get("agent_id")?,
            source_type: NodeKind::parse_name(&source_type).unwrap_or(NodeKind::Fact),
            source_id: row.get("source_id")?,
            target_type: NodeKind::parse_name(&target_type).unwrap_or(NodeKind::Fact),
            target_id: row.get("target_id")?,
            relation: Relation::parse_name(&relation).unwrap_or(Relation::RelatesTo),
            weight: row.get("weight")?,
            metadata: Self::json_or_default(row.get("metadata")?),
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
        })
    }

    /// Create or refresh an edge. Returns the canonical row (the original id
    /// when the five-tuple already existed).
    pub fn upsert_edge(&self, input: &NewEdge) -> Result<MemoryEdge> {
        if input.weight < 0.0 {
            return Err(StoreError::InvalidArgument(
                "weight must be non-negative".to_string(),
            ));
        }
        let agent_id = self.resolve_agent_id(&input.agent_id)?;
        let now = Utc::now().to_rfc3339();
        let metadata = serde_json::to_string(
            input
                .metadata
                .as_ref()
                .unwrap_or(&serde_json::Value::Object(serde_json::Map::new())),
        )?;

        let writer = self.lock_writer()?;
        writer.execute(
            "INSERT INTO memory_edges (id, agent_id, source_type, source_id, target_type, target_id,
                                       relation, weight, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(source_type, source_id, target_type, target_id, relation)
             DO UPDATE SET weight = excluded.weight,
                           metadata = excluded.metadata,
                           updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                agent_id,
                input.source_type.as_str(),
                input.source_id,
                input.target_type.as_str(),
                input.target_id,
                input.relation.as_str(),
                input.weight,
                metadata,
                now,
            ],
        )?;

        let edge = writer
            .query_row(
                "SELECT * FROM memory_edges
                 WHERE source_type = ?1 AND source_id = ?2
                   AND target_type = ?3 AND target_id = ?4 AND relation = ?5",
                params![
                    input.source_type.as_str(),
                    input.source_id,
                    input.target_type.as_str(),
                    input.target_id,
                    input.relation.as_str(),
                ],
                Self::row_to_edge,
            )
            .optional()?;
        edge.ok_or_else(|| StoreError::Init("edge vanished during upsert".to_string()))
    }

    pub fn get_edge(&self, id: &str) -> Result<MemoryEdge> {
        let reader = self.lock_reader()?;
        reader
            .query_row(
                "SELECT * FROM memory_edges WHERE id = ?1",
                params![id],
                Self::row_to_edge,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("edge '{}'", id)))
    }

    /// List edges matching any subset of filter fields.
    pub fn list_edges(&self, filter: &EdgeFilter) -> Result<Vec<MemoryEdge>> {
        let agent_id = match &filter.agent {
            Some(a) => Some(self.resolve_agent_id(a)?),
            None => None,
        };

        let mut sql = "SELECT * FROM memory_edges WHERE 1=1".to_string();
        let mut bindings: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let mut push = |sql: &mut String, clause: &str, value: Box<dyn rusqlite::ToSql>| {
            bindings.push(value);
            sql.push_str(&format!(" AND {} = ?{}", clause, bindings.len()));
        };

        if let Some(agent_id) = agent_id {
            push(&mut sql, "agent_id", Box::new(agent_id));
        }
        if let Some(source_type) = filter.source_type {
            push(&mut sql, "source_type", Box::new(source_type.as_str()));
        }
        if let Some(source_id) = &filter.source_id {
            push(&mut sql, "source_id", Box::new(source_id.clone()));
        }
        if let Some(target_type) = filter.target_type {
            push(&mut sql, "target_type", Box::new(target_type.as_str()));
        }
        if let Some(target_id) = &filter.target_id {
            push(&mut sql, "target_id", Box::new(target_id.clone()));
        }
        if let Some(relation) = filter.relation {
            push(&mut sql, "relation", Box::new(relation.as_str()));
        }

        bindings.push(Box::new(filter.limit.unwrap_or(100).clamp(1, 1000)));
        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT ?{}", bindings.len()));

        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let params = rusqlite::params_from_iter(bindings.iter().map(|b| b.as_ref()));
        let edges = stmt
            .query_map(params, Self::row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// Every edge incident to a node for one agent, in both directions.
    /// A self-edge appears once per direction.
    pub fn edges_for_node(
        &self,
        agent_id: &str,
        kind: NodeKind,
        id: &str,
    ) -> Result<(Vec<MemoryEdge>, Vec<MemoryEdge>)> {
        let reader = self.lock_reader()?;

        let mut stmt = reader.prepare(
            "SELECT * FROM memory_edges
             WHERE agent_id = ?1 AND source_type = ?2 AND source_id = ?3
             ORDER BY weight DESC",
        )?;
        let outgoing = stmt
            .query_map(params![agent_id, kind.as_str(), id], Self::row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = reader.prepare(
            "SELECT * FROM memory_edges
             WHERE agent_id = ?1 AND target_type = ?2 AND target_id = ?3
             ORDER BY weight DESC",
        )?;
        let incoming = stmt
            .query_map(params![agent_id, kind.as_str(), id], Self::row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((outgoing, incoming))
    }

    /// Unscoped bidirectional view for the graph endpoint: every edge where
    /// the node appears as source (outgoing) or target (incoming).
    pub fn node_graph(&self, kind: NodeKind, id: &str) -> Result<(Vec<MemoryEdge>, Vec<MemoryEdge>)> {
        let reader = self.lock_reader()?;

        let mut stmt = reader.prepare(
            "SELECT * FROM memory_edges WHERE source_type = ?1 AND source_id = ?2 ORDER BY weight DESC",
        )?;
        let outgoing = stmt
            .query_map(params![kind.as_str(), id], Self::row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = reader.prepare(
            "SELECT * FROM memory_edges WHERE target_type = ?1 AND target_id = ?2 ORDER BY weight DESC",
        )?;
        let incoming = stmt
            .query_map(params![kind.as_str(), id], Self::row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((outgoing, incoming))
    }

    /// Delete by id; reports whether the edge existed.
    pub fn delete_edge(&self, id: &str) -> Result<bool> {
        let writer = self.lock_writer()?;
        Ok(writer.execute("DELETE FROM memory_edges WHERE id = ?1", params![id])? > 0)
    }
}

// ============================================================================
// TESTS
// ============================================================================
