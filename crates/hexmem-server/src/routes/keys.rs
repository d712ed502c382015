//! API key management. The raw key appears in exactly one response: creation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use hexmem_core::{ApiKey, Permission};

use crate::auth::{self, AuthContext};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewKeyRequest {
    pub name: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default = "default_permissions")]
    pub permissions: Vec<Permission>,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: i64,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_permissions() -> Vec<Permission> {
    vec![Permission::Read]
}

fn default_rate_limit() -> i64 {
    120
}

pub async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(input): Json<NewKeyRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    ctx.require(Permission::Admin)?;

    // Scope must point at a real agent
    let agent_id = match &input.agent_id {
        Some(agent) => Some(state.storage.resolve_agent_id(agent)?),
        None => None,
    };

    let (raw, key_prefix, key_hash) = auth::generate_key();
    let key = ApiKey {
        id: Uuid::new_v4().to_string(),
        key_hash,
        key_prefix,
        name: input.name,
        agent_id,
        permissions: input.permissions,
        rate_limit: input.rate_limit,
        expires_at: input.expires_at,
        last_used_at: None,
        revoked_at: None,
        created_at: Utc::now(),
    };
    state.storage.insert_api_key(&key)?;

    let mut body = serde_json::to_value(&key).map_err(hexmem_core::StoreError::from)?;
    body["key"] = json!(raw);
    Ok((StatusCode::CREATED, Json(body)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Vec<ApiKey>>> {
    ctx.require(Permission::Admin)?;
    Ok(Json(state.storage.list_api_keys()?))
}

pub async fn revoke(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    ctx.require(Permission::Admin)?;
    state.storage.revoke_api_key(&id)?;
    Ok(StatusCode::NO_CONTENT)
}
