//! HTTP-facing errors.
//!
//! Handlers return `Result<_, ApiError>`; domain and storage errors convert
//! into it with `?` and render as `{ "error": ..., "message": ... }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::marketplace::{LifecycleError, ValidationError};
use crate::store::StoreError;

/// JSON error body shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("internal server error")]
    Internal,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Internal => None,
            other => Some(other.to_string()),
        };
        let body = ErrorResponse {
            error: self.code().to_string(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Forbidden(msg) => ApiError::Forbidden(msg),
            LifecycleError::InvalidState(msg) => ApiError::BadRequest(msg),
            LifecycleError::Conflict(msg) => ApiError::Conflict(msg),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.0)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Lifecycle(e) => e.into(),
            StoreError::Database(e) => {
                tracing::error!(error = %e, "database error");
                ApiError::Internal
            }
            StoreError::Corrupt(msg) => {
                tracing::error!(detail = %msg, "corrupt record in storage");
                ApiError::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, ErrorResponse) {
        let res = err.into_response();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_lifecycle_errors_map_to_status_codes() {
        let forbidden: ApiError = LifecycleError::Forbidden("no".into()).into();
        let invalid: ApiError = LifecycleError::InvalidState("no".into()).into();
        let conflict: ApiError = LifecycleError::Conflict("no".into()).into();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_store_lifecycle_error_is_unwrapped() {
        let err: ApiError =
            StoreError::Lifecycle(LifecycleError::Forbidden("owner only".into())).into();
        assert!(matches!(err, ApiError::Forbidden(ref m) if m == "owner only"));
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let (status, body) = body_of(ApiError::NotFound("demanda")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "not_found");
        assert_eq!(body.message.as_deref(), Some("demanda not found"));
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let (status, body) = body_of(StoreError::Corrupt("bad status".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "internal_error");
        assert!(body.message.is_none());
    }
}
