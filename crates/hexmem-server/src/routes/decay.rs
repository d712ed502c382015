//! Decay status and the manual sweep trigger.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use hexmem_core::decay;
use hexmem_core::{DecayStatusReport, Permission, SweepStats};

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DecayScope {
    pub agent_id: Option<String>,
}

pub async fn status(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(scope): Query<DecayScope>,
) -> ApiResult<Json<DecayStatusReport>> {
    ctx.require(Permission::Read)?;
    Ok(Json(decay::status(&state.storage, scope.agent_id.as_deref())?))
}

/// Manual trigger; `?agent_id=` scopes the sweep.
pub async fn sweep(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(scope): Query<DecayScope>,
) -> ApiResult<Json<SweepStats>> {
    ctx.require(Permission::Write)?;
    Ok(Json(decay::sweep(&state.storage, scope.agent_id.as_deref())?))
}
