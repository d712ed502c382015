//! Edge graph endpoints.
//!
//! Routes speak of "edges"; the backing table name never leaks into
//! responses. Graph views resolve dangling endpoints to a 404 only for the
//! root node — incident edges are returned as stored.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use hexmem_core::{EdgeFilter, MemoryEdge, NewEdge, NodeKind, Permission, Relation, StoreError};

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(input): Json<NewEdge>,
) -> ApiResult<(StatusCode, Json<MemoryEdge>)> {
    ctx.require(Permission::Write)?;
    let edge = state.storage.upsert_edge(&input)?;
    Ok((StatusCode::CREATED, Json(edge)))
}

#[derive(Debug, Default, Deserialize)]
pub struct EdgeListParams {
    pub agent_id: Option<String>,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub relation: Option<String>,
    pub limit: Option<i64>,
}

fn parse_node_kind(value: &str) -> Result<NodeKind, StoreError> {
    NodeKind::parse_name(value)
        .ok_or_else(|| StoreError::InvalidArgument(format!("unknown node type '{}'", value)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<EdgeListParams>,
) -> ApiResult<Json<Vec<MemoryEdge>>> {
    ctx.require(Permission::Read)?;

    let filter = EdgeFilter {
        agent: params.agent_id,
        source_type: params.source_type.as_deref().map(parse_node_kind).transpose()?,
        source_id: params.source_id,
        target_type: params.target_type.as_deref().map(parse_node_kind).transpose()?,
        target_id: params.target_id,
        relation: params
            .relation
            .as_deref()
            .map(|r| {
                Relation::parse_name(r).ok_or_else(|| {
                    StoreError::InvalidArgument(format!("unknown relation '{}'", r))
                })
            })
            .transpose()?,
        limit: params.limit,
    };

    Ok(Json(state.storage.list_edges(&filter)?))
}

/// Bidirectional node view: `{node, outgoing, incoming, total}`.
pub async fn graph(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path((node_type, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    ctx.require(Permission::Read)?;

    let kind = parse_node_kind(&node_type)?;
    let node = state
        .storage
        .fetch_node_summary(kind, &id)?
        .ok_or_else(|| StoreError::NotFound(format!("{} '{}'", kind, id)))?;

    let (outgoing, incoming) = state.storage.node_graph(kind, &id)?;
    let total = outgoing.len() + incoming.len();

    Ok(Json(json!({
        "node": node,
        "outgoing": outgoing,
        "incoming": incoming,
        "total": total,
    })))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    ctx.require(Permission::Write)?;
    if state.storage.delete_edge(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StoreError::NotFound(format!("edge '{}'", id)).into())
    }
}
