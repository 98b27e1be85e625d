/**
 * Service Catalog Routes
 * Public, read-only
 */
use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::marketplace::Service;
use crate::state::AppState;

/// GET /api/v1/services/
pub async fn list_services(State(state): State<AppState>) -> ApiResult<Json<Vec<Service>>> {
    Ok(Json(state.store.list_services().await?))
}

/// GET /api/v1/services/{id}/
pub async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Service>> {
    state
        .store
        .find_service(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("service"))
}
