//! Analytics summary over the query log.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use hexmem_core::analytics::QuerySummary;
use hexmem_core::Permission;

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsParams {
    pub limit: Option<i64>,
}

pub async fn queries(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<AnalyticsParams>,
) -> ApiResult<Json<QuerySummary>> {
    ctx.require(Permission::Read)?;
    Ok(Json(state.storage.query_summary(params.limit.unwrap_or(20))?))
}
