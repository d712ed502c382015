//! Hybrid Recall Planner
//!
//! Fan-out per memory kind over two arms — semantic (cosine over embeddings)
//! and lexical (trigram similarity over canonical content) — then per-item
//! merge, recency blending, weighted rerank, top-K cut, one-hop graph
//! expansion, and best-effort access accounting.
//!
//! The semantic arm is skipped entirely when the query cannot be embedded;
//! the response stays well-formed either way.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::embeddings::vector_to_bytes;
use crate::memory::{MemoryKind, NodeKind};
use crate::storage::{Result, Storage, StoreError};

/// Server-side default result count.
pub const DEFAULT_LIMIT: i64 = 20;
/// Default fusion weights.
pub const DEFAULT_SEMANTIC_WEIGHT: f64 = 0.7;
pub const DEFAULT_KEYWORD_WEIGHT: f64 = 0.2;
pub const DEFAULT_RECENCY_WEIGHT: f64 = 0.1;
/// Fixed weight applied to graph-injected boosts.
pub const GRAPH_BOOST_WEIGHT: f64 = 0.1;
/// Lexical arm floor: rows below this trigram similarity never surface.
pub const LEXICAL_FLOOR: f64 = 0.1;
/// Recency window. Items older than this score zero recency.
pub const MAX_AGE_DAYS: f64 = 90.0;
/// One-hop expansion applies to this many of the top-K results.
pub const EXPANSION_FANOUT: usize = 5;
/// Direct search defaults.
pub const SEARCH_DEFAULT_THRESHOLD: f64 = 0.3;
pub const SEARCH_MAX_LIMIT: i64 = 100;

// ============================================================================
// REQUEST / RESPONSE SHAPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecallRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub types: Option<Vec<String>>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub semantic_weight: Option<f64>,
    #[serde(default)]
    pub keyword_weight: Option<f64>,
    #[serde(default)]
    pub recency_weight: Option<f64>,
    #[serde(default)]
    pub include_related: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Weights {
    pub semantic: f64,
    pub keyword: f64,
    pub recency: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Signals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_boost: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallResult {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub content: String,
    pub score: f64,
    pub signals: Signals,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<Vec<RecallResult>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallResponse {
    pub results: Vec<RecallResult>,
    pub total: usize,
    pub query: String,
    pub weights: Weights,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub types: Option<Vec<String>>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub content: String,
    pub similarity: f64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total: usize,
    pub query: String,
}

// ============================================================================
// CANDIDATE ASSEMBLY
// ============================================================================

struct Candidate {
    content: String,
    created_at: DateTime<Utc>,
    metadata: Value,
    semantic: Option<f64>,
    keyword: Option<f64>,
}

fn parse_kinds(types: &Option<Vec<String>>) -> Result<Vec<MemoryKind>> {
    match types {
        None => Ok(MemoryKind::ALL.to_vec()),
        Some(names) => {
            let mut kinds = Vec::with_capacity(names.len());
            for name in names {
                let kind = MemoryKind::parse_name(name).ok_or_else(|| {
                    StoreError::InvalidArgument(format!("unknown memory type '{}'", name))
                })?;
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
            Ok(kinds)
        }
    }
}

/// Column used for per-kind result metadata.
fn metadata_column(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::SessionMessage => "role",
        _ => "tags",
    }
}

fn metadata_value(kind: MemoryKind, raw: String) -> Value {
    match kind {
        MemoryKind::SessionMessage => json!({ "role": raw }),
        _ => json!({ "tags": serde_json::from_str::<Vec<String>>(&raw).unwrap_or_default() }),
    }
}

fn recency_of(now: DateTime<Utc>, created_at: DateTime<Utc>) -> f64 {
    let age_days = (now - created_at).num_seconds().max(0) as f64 / 86_400.0;
    (1.0 - age_days / MAX_AGE_DAYS).max(0.0)
}

type CandidateMap = HashMap<(MemoryKind, String), Candidate>;

fn collect_semantic_arm(
    storage: &Storage,
    kind: MemoryKind,
    agent_id: &str,
    query_vector: &[f32],
    limit: i64,
    candidates: &mut CandidateMap,
) -> Result<()> {
    let sql = format!(
        "SELECT id, {expr} AS content, {time_col} AS ts, {meta} AS meta,
                vec_sim(embedding, ?1) AS sim
         FROM {table}
         WHERE agent_id = ?2 AND decay_status = 'active' AND embedding IS NOT NULL
         ORDER BY sim DESC LIMIT ?3",
        expr = kind.content_expr(),
        time_col = kind.time_column(),
        meta = metadata_column(kind),
        table = kind.table(),
    );

    let blob = vector_to_bytes(query_vector);
    let reader = storage.lock_reader()?;
    let mut stmt = reader.prepare(&sql)?;
    let rows = stmt.query_map(params![blob, agent_id, limit], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, f64>(4)?,
        ))
    })?;

    for row in rows {
        let (id, content, ts, meta, sim) = row?;
        let created_at = Storage::parse_timestamp(&ts, "created_at")?;
        candidates
            .entry((kind, id))
            .or_insert_with(|| Candidate {
                content,
                created_at,
                metadata: metadata_value(kind, meta),
                semantic: None,
                keyword: None,
            })
            .semantic = Some(sim);
    }
    Ok(())
}

fn collect_lexical_arm(
    storage: &Storage,
    kind: MemoryKind,
    agent_id: &str,
    query: &str,
    limit: i64,
    candidates: &mut CandidateMap,
) -> Result<()> {
    let sql = format!(
        "SELECT id, {expr} AS content, {time_col} AS ts, {meta} AS meta,
                trgm_sim({expr}, ?1) AS sim
         FROM {table}
         WHERE agent_id = ?2 AND decay_status = 'active' AND trgm_sim({expr}, ?1) > ?3
         ORDER BY sim DESC LIMIT ?4",
        expr = kind.content_expr(),
        time_col = kind.time_column(),
        meta = metadata_column(kind),
        table = kind.table(),
    );

    let reader = storage.lock_reader()?;
    let mut stmt = reader.prepare(&sql)?;
    let rows = stmt.query_map(params![query, agent_id, LEXICAL_FLOOR, limit], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, f64>(4)?,
        ))
    })?;

    for row in rows {
        let (id, content, ts, meta, sim) = row?;
        let created_at = Storage::parse_timestamp(&ts, "created_at")?;
        candidates
            .entry((kind, id))
            .or_insert_with(|| Candidate {
                content,
                created_at,
                metadata: metadata_value(kind, meta),
                semantic: None,
                keyword: None,
            })
            .keyword = Some(sim);
    }
    Ok(())
}

// ============================================================================
// RECALL
// ============================================================================

/// Hybrid recall per the planner contract. `agent_id` and `query` are
/// required; everything else has defaults.
pub fn recall(storage: &Storage, request: RecallRequest) -> Result<RecallResponse> {
    let query = request
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| StoreError::InvalidArgument("query is required".to_string()))?
        .to_string();
    let agent = request
        .agent_id
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| StoreError::InvalidArgument("agent_id is required".to_string()))?;
    let agent_id = storage.resolve_agent_id(agent)?;

    let kinds = parse_kinds(&request.types)?;
    let limit = request.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 200);
    let weights = Weights {
        semantic: request.semantic_weight.unwrap_or(DEFAULT_SEMANTIC_WEIGHT),
        keyword: request.keyword_weight.unwrap_or(DEFAULT_KEYWORD_WEIGHT),
        recency: request.recency_weight.unwrap_or(DEFAULT_RECENCY_WEIGHT),
    };
    let include_related = request.include_related.unwrap_or(true);

    // Lexical-only fallback: a failed query embedding just skips the arm
    let query_vector = storage.embed_query(&query);

    let mut candidates: CandidateMap = HashMap::new();
    for kind in &kinds {
        if let Some(vector) = &query_vector {
            collect_semantic_arm(storage, *kind, &agent_id, vector, limit, &mut candidates)?;
        }
        collect_lexical_arm(storage, *kind, &agent_id, &query, limit, &mut candidates)?;
    }

    let now = Utc::now();
    let mut results: Vec<RecallResult> = candidates
        .into_iter()
        .map(|((kind, id), c)| {
            let recency = recency_of(now, c.created_at);
            let score = weights.semantic * c.semantic.unwrap_or(0.0)
                + weights.keyword * c.keyword.unwrap_or(0.0)
                + weights.recency * recency;
            RecallResult {
                id,
                kind: kind.into(),
                content: c.content,
                score,
                signals: Signals {
                    semantic: c.semantic,
                    keyword: c.keyword,
                    recency: Some(recency),
                    graph_boost: None,
                },
                metadata: c.metadata,
                created_at: c.created_at,
                related: None,
            }
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit as usize);

    if include_related {
        expand_one_hop(storage, &agent_id, &mut results);
    }

    // Read-through accounting; failures never affect the response
    for result in &results {
        if let Some(kind) = result.kind.memory_kind() {
            if let Err(e) = storage.bump_access(kind, &result.id) {
                tracing::debug!("access bump failed for {} '{}': {}", result.kind, result.id, e);
            }
        }
    }

    Ok(RecallResponse {
        total: results.len(),
        results,
        query,
        weights,
    })
}

/// Depth-exactly-1 neighbor expansion over the first few top-K rows.
/// Dangling edge endpoints are skipped; any failure leaves the parent as-is.
fn expand_one_hop(storage: &Storage, agent_id: &str, results: &mut [RecallResult]) {
    for result in results.iter_mut().take(EXPANSION_FANOUT) {
        let (outgoing, incoming) =
            match storage.edges_for_node(agent_id, result.kind, &result.id) {
                Ok(edges) => edges,
                Err(e) => {
                    tracing::debug!("edge expansion failed for '{}': {}", result.id, e);
                    continue;
                }
            };

        let mut related = Vec::new();
        let directed = outgoing
            .iter()
            .map(|e| (e, "outgoing", e.target_type, e.target_id.clone()))
            .chain(
                incoming
                    .iter()
                    .map(|e| (e, "incoming", e.source_type, e.source_id.clone())),
            );

        for (edge, direction, neighbor_kind, neighbor_id) in directed {
            let summary = match storage.fetch_node_summary(neighbor_kind, &neighbor_id) {
                Ok(Some(summary)) => summary,
                Ok(None) => continue, // dangling edge
                Err(e) => {
                    tracing::debug!("neighbor fetch failed for '{}': {}", neighbor_id, e);
                    continue;
                }
            };

            related.push(RecallResult {
                id: summary.id,
                kind: summary.kind,
                content: summary.content,
                score: edge.weight,
                signals: Signals {
                    graph_boost: Some(edge.weight),
                    ..Default::default()
                },
                metadata: json!({ "relation": edge.relation, "direction": direction }),
                created_at: summary.created_at,
                related: None,
            });
        }

        if !related.is_empty() {
            result.related = Some(related);
        }
    }
}

// ============================================================================
// DIRECT VECTOR SEARCH
// ============================================================================

/// Vector-only search: no lexical arm, no recency blending, hard requirement
/// on the embedder.
pub fn search(storage: &Storage, request: SearchRequest) -> Result<SearchResponse> {
    let query = request
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| StoreError::InvalidArgument("query is required".to_string()))?
        .to_string();
    let agent = request
        .agent_id
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| StoreError::InvalidArgument("agent_id is required".to_string()))?;
    let agent_id = storage.resolve_agent_id(agent)?;

    let kinds = parse_kinds(&request.types)?;
    let limit = request.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, SEARCH_MAX_LIMIT);
    let threshold = request.threshold.unwrap_or(SEARCH_DEFAULT_THRESHOLD);

    let embedder = storage.require_embedder()?;
    let query_vector = embedder.embed(&query).map_err(|e| {
        StoreError::CapabilityUnavailable(format!("embedding failed: {}", e))
    })?;
    let blob = vector_to_bytes(&query_vector);

    let mut hits = Vec::new();
    for kind in kinds {
        let sql = format!(
            "SELECT id, {expr} AS content, {time_col} AS ts, {meta} AS meta,
                    vec_sim(embedding, ?1) AS sim
             FROM {table}
             WHERE agent_id = ?2 AND decay_status = 'active' AND embedding IS NOT NULL
               AND vec_sim(embedding, ?1) > ?3
             ORDER BY sim DESC LIMIT ?4",
            expr = kind.content_expr(),
            time_col = kind.time_column(),
            meta = metadata_column(kind),
            table = kind.table(),
        );

        let reader = storage.lock_reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt.query_map(params![blob, agent_id, threshold, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
            ))
        })?;

        for row in rows {
            let (id, content, ts, meta, sim) = row?;
            hits.push(SearchHit {
                id,
                kind: kind.into(),
                content,
                similarity: sim,
                metadata: metadata_value(kind, meta),
                created_at: Storage::parse_timestamp(&ts, "created_at")?,
            });
        }
    }

    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(limit as usize);

    Ok(SearchResponse {
        total: hits.len(),
        results: hits,
        query,
    })
}

// ============================================================================
// TESTS
// ============================================================================
