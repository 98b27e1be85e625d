/**
 * Demanda Routes
 * Service requests posted by clients
 */
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::CurrentUser;
use super::{display_name, SearchQuery};
use crate::error::{ApiError, ApiResult};
use crate::marketplace::{
    lifecycle, validate, Actor, Demanda, DemandaPatch, DemandaScope, DemandaStatus, NewDemanda,
};
use crate::state::AppState;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDemandaRequest {
    pub service: Uuid,
    pub title: String,
    pub description: String,
    pub cep: String,
}

/// Edit payload; absent fields are kept. `status` is accepted only so that an
/// attempt to change it can be refused.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDemandaRequest {
    pub service: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub cep: Option<String>,
    pub status: Option<DemandaStatus>,
}

impl UpdateDemandaRequest {
    fn into_patch(self) -> Result<DemandaPatch, validate::ValidationError> {
        Ok(DemandaPatch {
            service_id: self.service,
            title: self.title.as_deref().map(validate::validate_title).transpose()?,
            description: self
                .description
                .as_deref()
                .map(validate::validate_description)
                .transpose()?,
            cep: self.cep.as_deref().map(validate::normalize_cep).transpose()?,
            status: self.status,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandaView {
    pub id: Uuid,
    pub client: Uuid,
    pub client_name: String,
    pub professional: Option<Uuid>,
    pub professional_name: Option<String>,
    pub service: Uuid,
    pub service_name: String,
    pub service_icon: String,
    pub title: String,
    pub description: String,
    pub cep: String,
    pub status: DemandaStatus,
    pub accepted_offer_value: Option<f64>,
    pub created_at: DateTime<Utc>,
}

async fn demanda_view(state: &AppState, demanda: Demanda) -> ApiResult<DemandaView> {
    let service = state.store.find_service(demanda.service_id).await?;
    let client_name = display_name(state, demanda.client_id).await?;
    let professional_name = match demanda.professional_id {
        Some(id) => Some(display_name(state, id).await?),
        None => None,
    };
    let accepted_offer_value = match demanda.status {
        DemandaStatus::InProgress | DemandaStatus::Completed => state
            .store
            .accepted_offer(demanda.id)
            .await?
            .map(|offer| validate::cents_to_value(offer.value_cents)),
        _ => None,
    };

    let (service_name, service_icon) = service
        .map(|s| (s.name, s.icon))
        .unwrap_or_default();

    Ok(DemandaView {
        id: demanda.id,
        client: demanda.client_id,
        client_name,
        professional: demanda.professional_id,
        professional_name,
        service: demanda.service_id,
        service_name,
        service_icon,
        title: demanda.title,
        description: demanda.description,
        cep: demanda.cep,
        status: demanda.status,
        accepted_offer_value,
        created_at: demanda.created_at,
    })
}

/// Loads a demanda the caller may see; anything else is reported as missing.
async fn load_visible(state: &AppState, actor: &Actor, id: Uuid) -> ApiResult<Demanda> {
    state
        .store
        .find_demanda(id)
        .await?
        .filter(|d| lifecycle::can_view_demanda(actor, d))
        .ok_or(ApiError::NotFound("demanda"))
}

/// GET /api/v1/demandas/?search=
pub async fn list_demandas(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<DemandaView>>> {
    let scope = DemandaScope::for_actor(&user.actor());
    let demandas = state.store.list_demandas(scope, &query.term()).await?;

    let mut views = Vec::with_capacity(demandas.len());
    for demanda in demandas {
        views.push(demanda_view(&state, demanda).await?);
    }
    Ok(Json(views))
}

/// POST /api/v1/demandas/
pub async fn create_demanda(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateDemandaRequest>,
) -> ApiResult<(StatusCode, Json<DemandaView>)> {
    let actor = user.actor();
    lifecycle::ensure_can_create_demanda(&actor)?;

    let new = NewDemanda {
        service_id: payload.service,
        title: validate::validate_title(&payload.title)?,
        description: validate::validate_description(&payload.description)?,
        cep: validate::normalize_cep(&payload.cep)?,
    };
    let demanda = state.store.create_demanda(actor, new).await?;

    tracing::info!(
        demanda_id = %demanda.id,
        client_id = %actor.id,
        service_id = %demanda.service_id,
        "demanda created"
    );

    Ok((StatusCode::CREATED, Json(demanda_view(&state, demanda).await?)))
}

/// GET /api/v1/demandas/{id}/
pub async fn get_demanda(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DemandaView>> {
    let demanda = load_visible(&state, &user.actor(), id).await?;
    Ok(Json(demanda_view(&state, demanda).await?))
}

/// PUT|PATCH /api/v1/demandas/{id}/
pub async fn update_demanda(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDemandaRequest>,
) -> ApiResult<Json<DemandaView>> {
    let actor = user.actor();
    load_visible(&state, &actor, id).await?;

    let patch = payload.into_patch()?;
    let demanda = state.store.update_demanda(actor, id, patch).await?;

    tracing::info!(demanda_id = %id, client_id = %actor.id, "demanda updated");
    Ok(Json(demanda_view(&state, demanda).await?))
}

/// DELETE /api/v1/demandas/{id}/
pub async fn delete_demanda(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = user.actor();
    load_visible(&state, &actor, id).await?;
    state.store.delete_demanda(actor, id).await?;

    tracing::info!(demanda_id = %id, client_id = %actor.id, "demanda deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/demandas/{id}/concluir/
pub async fn conclude_demanda(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DemandaView>> {
    let actor = user.actor();
    load_visible(&state, &actor, id).await?;
    let demanda = state.store.conclude_demanda(actor, id).await?;

    tracing::info!(
        demanda_id = %id,
        professional_id = %actor.id,
        status = %demanda.status,
        "demanda completed"
    );
    Ok(Json(demanda_view(&state, demanda).await?))
}
