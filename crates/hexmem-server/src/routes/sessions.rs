//! Session lifecycle and the ingestion hot path.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::Value;

use hexmem_core::{IngestOutcome, NewMessage, NewSession, Permission, Session, SessionMessage};

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(input): Json<NewSession>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    ctx.require(Permission::Write)?;
    let session = state.storage.create_session(input)?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize)]
pub struct SessionListParams {
    pub agent_id: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<SessionListParams>,
) -> ApiResult<Json<Vec<Session>>> {
    ctx.require(Permission::Read)?;
    Ok(Json(state.storage.list_sessions(params.agent_id.as_deref())?))
}

/// Session detail including `message_count`.
pub async fn get(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    ctx.require(Permission::Read)?;
    let session = state.storage.get_session(&id)?;
    let message_count = state.storage.session_message_count(&id)?;

    let mut body = serde_json::to_value(&session).map_err(hexmem_core::StoreError::from)?;
    body["message_count"] = serde_json::json!(message_count);
    Ok(Json(body))
}

/// The ingestion hot path: persist, extract, link.
pub async fn add_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(input): Json<NewMessage>,
) -> ApiResult<(StatusCode, Json<IngestOutcome>)> {
    ctx.require(Permission::Write)?;
    let outcome = state.pipeline.add_message(&id, input)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<SessionMessage>>> {
    ctx.require(Permission::Read)?;
    // Listing messages of an unknown session is a 404, not an empty list
    state.storage.get_session(&id)?;
    Ok(Json(state.storage.list_messages(&id)?))
}

/// Summarize (best-effort) and mark ended. Re-ending is a 400.
pub async fn end(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    ctx.require(Permission::Write)?;
    Ok(Json(state.pipeline.end_session(&id)?))
}
