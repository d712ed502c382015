//! HTTP error mapping.
//!
//! Every handler returns `ApiResult<T>`; this module is the single place
//! where engine errors become status codes and `{"error": ...}` bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use hexmem_core::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    PermissionDenied(String),
}

/// Status for an engine error, usable without wrapping it first.
pub fn store_error_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::CapabilityUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::Store(e) => store_error_status(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal detail stays in the log, not the response
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("internal error: {}", self);
            return (status, Json(json!({ "error": "internal error" }))).into_response();
        }

        let body = match &self {
            ApiError::Store(StoreError::Conflict {
                message,
                existing_id,
                similarity,
            }) => {
                let mut body = json!({ "error": message });
                if let Some(existing_id) = existing_id {
                    body["existing_id"] = json!(existing_id);
                }
                if let Some(similarity) = similarity {
                    body["similarity"] = json!(similarity);
                }
                body
            }
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (
                ApiError::Store(StoreError::InvalidArgument("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Unauthenticated("no token".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::PermissionDenied("write needed".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::Store(StoreError::NotFound("fact 'x'".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Store(StoreError::Conflict {
                    message: "dup".into(),
                    existing_id: None,
                    similarity: None,
                }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Store(StoreError::CapabilityUnavailable("embedder".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected);
        }
    }
}
