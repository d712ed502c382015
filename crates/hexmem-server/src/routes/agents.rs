//! Agent CRUD plus the core-memory merge-patch endpoint.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde_json::Value;

use hexmem_core::{Agent, AgentPatch, NewAgent, Permission};

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(input): Json<NewAgent>,
) -> ApiResult<(StatusCode, Json<Agent>)> {
    ctx.require(Permission::Write)?;
    let agent = state.storage.create_agent(input)?;
    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Agent>>> {
    ctx.require(Permission::Read)?;
    Ok(Json(state.storage.list_agents()?))
}

/// Resolve by UUID or slug; the response carries per-table counts.
pub async fn get(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    ctx.require(Permission::Read)?;
    let agent = state.storage.get_agent(&id)?;
    let counts = state.storage.agent_counts(&agent.id)?;

    let mut body = serde_json::to_value(&agent).map_err(hexmem_core::StoreError::from)?;
    body["counts"] = serde_json::to_value(counts).map_err(hexmem_core::StoreError::from)?;
    Ok(Json(body))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(patch): Json<AgentPatch>,
) -> ApiResult<Json<Agent>> {
    ctx.require(Permission::Write)?;
    Ok(Json(state.storage.update_agent(&id, patch)?))
}

/// JSON merge-patch with null-stripping, applied atomically.
pub async fn core_memory(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> ApiResult<Json<Agent>> {
    ctx.require(Permission::Write)?;
    Ok(Json(state.storage.patch_core_memory(&id, &patch)?))
}
