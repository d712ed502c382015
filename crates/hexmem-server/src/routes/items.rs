//! Direct CRUD over the typed memory tables.
//!
//! POST runs the near-duplicate detector (projects excepted) and returns 409
//! with `existing_id`/`similarity` on a match. PUT on a cooling or archived
//! item revives it before applying the patch.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use hexmem_core::ingest;
use hexmem_core::{
    Decision, DecisionPatch, Event, EventPatch, Fact, FactPatch, ListFilter, MemoryKind,
    NewDecision, NewEvent, NewFact, NewProject, NewTask, NodeKind, Permission, Project,
    ProjectPatch, StoreError, Task, TaskPatch,
};

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

/// Agent-scoped envelope for direct writes: `{"agent_id": ..., ...fields}`.
#[derive(Debug, Deserialize)]
pub struct Scoped<T> {
    pub agent_id: String,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub agent_id: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<i64>,
}

impl From<ListParams> for ListFilter {
    fn from(params: ListParams) -> Self {
        ListFilter {
            agent: params.agent_id,
            tag: params.tag,
            limit: params.limit,
        }
    }
}

fn scoped<T: DeserializeOwned>(payload: Scoped<T>) -> (String, T) {
    (payload.agent_id, payload.body)
}

fn revive_before_update(state: &AppState, kind: MemoryKind, id: &str) {
    // Editing a cooled/archived item is an explicit touch; failures fall
    // through to the update itself
    if let Err(e) = state.storage.revive(kind, id) {
        tracing::debug!("revive before update failed for {} '{}': {}", kind, id, e);
    }
}

// ============================================================================
// FACTS
// ============================================================================

pub async fn create_fact(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<Scoped<NewFact>>,
) -> ApiResult<(StatusCode, Json<Fact>)> {
    ctx.require(Permission::Write)?;
    let (agent, input) = scoped(payload);
    let fact = ingest::create_fact_checked(&state.storage, &agent, input)?;
    Ok((StatusCode::CREATED, Json(fact)))
}

pub async fn list_facts(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Fact>>> {
    ctx.require(Permission::Read)?;
    Ok(Json(state.storage.list_facts(&params.into())?))
}

pub async fn get_fact(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Fact>> {
    ctx.require(Permission::Read)?;
    Ok(Json(state.storage.get_fact(&id)?))
}

pub async fn update_fact(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(patch): Json<FactPatch>,
) -> ApiResult<Json<Fact>> {
    ctx.require(Permission::Write)?;
    revive_before_update(&state, MemoryKind::Fact, &id);
    Ok(Json(state.storage.update_fact(&id, patch)?))
}

pub async fn delete_fact(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    ctx.require(Permission::Write)?;
    delete_node(&state, NodeKind::Fact, &id)
}

// ============================================================================
// DECISIONS
// ============================================================================

pub async fn create_decision(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<Scoped<NewDecision>>,
) -> ApiResult<(StatusCode, Json<Decision>)> {
    ctx.require(Permission::Write)?;
    let (agent, input) = scoped(payload);
    let decision = ingest::create_decision_checked(&state.storage, &agent, input)?;
    Ok((StatusCode::CREATED, Json(decision)))
}

pub async fn list_decisions(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Decision>>> {
    ctx.require(Permission::Read)?;
    Ok(Json(state.storage.list_decisions(&params.into())?))
}

pub async fn get_decision(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Decision>> {
    ctx.require(Permission::Read)?;
    Ok(Json(state.storage.get_decision(&id)?))
}

pub async fn update_decision(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(patch): Json<DecisionPatch>,
) -> ApiResult<Json<Decision>> {
    ctx.require(Permission::Write)?;
    revive_before_update(&state, MemoryKind::Decision, &id);
    Ok(Json(state.storage.update_decision(&id, patch)?))
}

pub async fn delete_decision(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    ctx.require(Permission::Write)?;
    delete_node(&state, NodeKind::Decision, &id)
}

// ============================================================================
// TASKS
// ============================================================================

pub async fn create_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<Scoped<NewTask>>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    ctx.require(Permission::Write)?;
    let (agent, input) = scoped(payload);
    let task = ingest::create_task_checked(&state.storage, &agent, input)?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Task>>> {
    ctx.require(Permission::Read)?;
    Ok(Json(state.storage.list_tasks(&params.into())?))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    ctx.require(Permission::Read)?;
    Ok(Json(state.storage.get_task(&id)?))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> ApiResult<Json<Task>> {
    ctx.require(Permission::Write)?;
    revive_before_update(&state, MemoryKind::Task, &id);
    Ok(Json(state.storage.update_task(&id, patch)?))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    ctx.require(Permission::Write)?;
    delete_node(&state, NodeKind::Task, &id)
}

// ============================================================================
// EVENTS
// ============================================================================

pub async fn create_event(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<Scoped<NewEvent>>,
) -> ApiResult<(StatusCode, Json<Event>)> {
    ctx.require(Permission::Write)?;
    let (agent, input) = scoped(payload);
    let event = ingest::create_event_checked(&state.storage, &agent, input)?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Event>>> {
    ctx.require(Permission::Read)?;
    Ok(Json(state.storage.list_events(&params.into())?))
}

pub async fn get_event(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Event>> {
    ctx.require(Permission::Read)?;
    Ok(Json(state.storage.get_event(&id)?))
}

pub async fn update_event(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(patch): Json<EventPatch>,
) -> ApiResult<Json<Event>> {
    ctx.require(Permission::Write)?;
    revive_before_update(&state, MemoryKind::Event, &id);
    Ok(Json(state.storage.update_event(&id, patch)?))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    ctx.require(Permission::Write)?;
    delete_node(&state, NodeKind::Event, &id)
}

// ============================================================================
// PROJECTS
// ============================================================================

pub async fn create_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<Scoped<NewProject>>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    ctx.require(Permission::Write)?;
    let (agent, input) = scoped(payload);
    let project = ingest::create_project(&state.storage, &agent, input)?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn list_projects(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Project>>> {
    ctx.require(Permission::Read)?;
    Ok(Json(state.storage.list_projects(&params.into())?))
}

pub async fn get_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Project>> {
    ctx.require(Permission::Read)?;
    Ok(Json(state.storage.get_project(&id)?))
}

pub async fn update_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(patch): Json<ProjectPatch>,
) -> ApiResult<Json<Project>> {
    ctx.require(Permission::Write)?;
    Ok(Json(state.storage.update_project(&id, patch)?))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    ctx.require(Permission::Write)?;
    delete_node(&state, NodeKind::Project, &id)
}

// ============================================================================
// SHARED
// ============================================================================

fn delete_node(state: &AppState, kind: NodeKind, id: &str) -> ApiResult<StatusCode> {
    if state.storage.delete_node(kind, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StoreError::NotFound(format!("{} '{}'", kind, id)).into())
    }
}
