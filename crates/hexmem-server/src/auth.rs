//! Bearer-token authentication.
//!
//! Tokens are either the configured development key (full permissions, no
//! agent scope) or persisted API keys matched by SHA-256 of the raw key.
//! Revoked and expired keys are 401; per-route permission checks are 403.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use rand::RngCore;
use sha2::{Digest, Sha256};

use hexmem_core::Permission;

use crate::error::ApiError;
use crate::state::AppState;

/// Raw keys look like `hm_<40 hex chars>`; the prefix stored for display is
/// the first 8 characters after `hm_`.
pub const KEY_PREFIX: &str = "hm_";

/// Per-request authentication result, attached as a request extension.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Persisted key id; `None` for the dev key.
    pub key_id: Option<String>,
    /// Agent scope; `None` means unscoped.
    pub agent_id: Option<String>,
    pub permissions: Vec<Permission>,
}

impl AuthContext {
    fn dev() -> Self {
        Self {
            key_id: None,
            agent_id: None,
            permissions: vec![Permission::Read, Permission::Write, Permission::Admin],
        }
    }

    pub fn require(&self, needed: Permission) -> Result<(), ApiError> {
        let granted = self.permissions.contains(&Permission::Admin)
            || self.permissions.contains(&needed);
        if granted {
            Ok(())
        } else {
            Err(ApiError::PermissionDenied(format!(
                "missing '{}' permission",
                needed.as_str()
            )))
        }
    }
}

/// Generate a raw key plus its stored form. The raw key is returned to the
/// caller exactly once.
pub fn generate_key() -> (String, String, String) {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw = format!("{}{}", KEY_PREFIX, hex::encode(bytes));
    let prefix = raw[..KEY_PREFIX.len() + 8].to_string();
    (raw.clone(), prefix, hash_key(&raw))
}

/// SHA-256 hex digest of a raw key.
pub fn hash_key(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn bearer_token(req: &Request) -> Result<&str, ApiError> {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthenticated("missing Authorization header".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthenticated("expected 'Bearer <token>'".to_string()))
}

/// Middleware guarding everything under `/api/v1`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req)?;

    let ctx = if state.dev_key.as_deref() == Some(token) {
        AuthContext::dev()
    } else {
        let key = state
            .storage
            .find_api_key_by_hash(&hash_key(token))
            .map_err(ApiError::Store)?
            .ok_or_else(|| ApiError::Unauthenticated("unknown API key".to_string()))?;

        if key.is_revoked() {
            return Err(ApiError::Unauthenticated("API key revoked".to_string()));
        }
        if key.is_expired(chrono::Utc::now()) {
            return Err(ApiError::Unauthenticated("API key expired".to_string()));
        }

        state.storage.touch_api_key(&key.id);

        AuthContext {
            key_id: Some(key.id),
            agent_id: key.agent_id,
            permissions: key.permissions,
        }
    };

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}
