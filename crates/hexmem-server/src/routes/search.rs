//! Retrieval endpoints: hybrid recall and direct vector search.
//!
//! Both wrap the planner with latency measurement and a best-effort append to
//! the analytics query log.

use std::time::Instant;

use axum::extract::State;
use axum::{Extension, Json};
use serde_json::json;

use hexmem_core::recall as planner;
use hexmem_core::{Permission, RecallRequest, RecallResponse, SearchRequest, SearchResponse};

use crate::auth::AuthContext;
use crate::error::{store_error_status, ApiResult};
use crate::state::AppState;

pub async fn recall(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(request): Json<RecallRequest>,
) -> ApiResult<Json<RecallResponse>> {
    ctx.require(Permission::Read)?;

    let agent_id = request.agent_id.clone();
    let query_text = request.query.clone();
    let start = Instant::now();

    let result = planner::recall(&state.storage, request);
    log_query(&state, "recall", agent_id, query_text, start, &result);

    Ok(Json(result?))
}

pub async fn search(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    ctx.require(Permission::Read)?;

    let agent_id = request.agent_id.clone();
    let query_text = request.query.clone();
    let start = Instant::now();

    let result = planner::search(&state.storage, request);
    log_query(&state, "search", agent_id, query_text, start, &result);

    Ok(Json(result?))
}

fn log_query<T>(
    state: &AppState,
    endpoint: &str,
    agent_id: Option<String>,
    query_text: Option<String>,
    start: Instant,
    result: &hexmem_core::Result<T>,
) {
    let status_code = match result {
        Ok(_) => 200,
        Err(e) => store_error_status(e).as_u16(),
    };
    state.storage.log_query(
        agent_id.as_deref(),
        endpoint,
        query_text.as_deref(),
        start.elapsed().as_millis() as i64,
        json!({ "method": "POST", "status_code": status_code }),
    );
}
