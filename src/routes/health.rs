/**
 * Health Routes
 * Liveness, storage check and readiness
 */
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Single service check result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub status: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub storage: ServiceCheck,
}

/// Detailed health check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub version: String,
    pub checks: HealthChecks,
}

/// Ready check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Simple health response
#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

async fn check_storage(state: &AppState) -> ServiceCheck {
    let backend = state.store.backend().to_string();
    match state.store.ping().await {
        Ok(duration) => ServiceCheck {
            status: "healthy".to_string(),
            backend,
            response_time: Some(duration.as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "storage health check failed");
            ServiceCheck {
                status: "unhealthy".to_string(),
                backend,
                response_time: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// GET /health - Simple health ping
pub async fn health_ping() -> impl IntoResponse {
    Json(SimpleHealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /health/detailed
/// The process answers "ok" while up; the storage check is reported alongside.
pub async fn health_detailed(State(state): State<AppState>) -> impl IntoResponse {
    let storage = check_storage(&state).await;

    let response = DetailedHealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        uptime: state.uptime_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks { storage },
    };

    (StatusCode::OK, Json(response))
}

/// GET /health/ready - 503 until the storage answers.
pub async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let storage = check_storage(&state).await;
    let ready = storage.status == "healthy";

    let response = ReadyResponse {
        status: if ready { "ready" } else { "not ready" }.to_string(),
        timestamp: Utc::now(),
        uptime: state.uptime_secs(),
        reason: storage.error,
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
