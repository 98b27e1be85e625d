/**
 * Offer Routes
 * Professional proposals and their acceptance by the client
 */
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::CurrentUser;
use super::display_name;
use crate::error::{ApiError, ApiResult};
use crate::marketplace::{lifecycle, validate, Actor, NewOffer, Offer, OfferScope, OfferStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOfferRequest {
    pub demanda: Uuid,
    pub value: f64,
    pub term: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferView {
    pub id: Uuid,
    pub demanda: Uuid,
    pub demanda_client_name: String,
    pub professional: Uuid,
    pub professional_name: String,
    pub value: f64,
    pub term: String,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}

async fn offer_view(state: &AppState, offer: Offer) -> ApiResult<OfferView> {
    let demanda_client_name = match state.store.find_demanda(offer.demanda_id).await? {
        Some(demanda) => display_name(state, demanda.client_id).await?,
        None => String::new(),
    };
    let professional_name = display_name(state, offer.professional_id).await?;

    Ok(OfferView {
        id: offer.id,
        demanda: offer.demanda_id,
        demanda_client_name,
        professional: offer.professional_id,
        professional_name,
        value: validate::cents_to_value(offer.value_cents),
        term: offer.term,
        status: offer.status,
        created_at: offer.created_at,
    })
}

/// Loads an offer visible to the caller: its professional or the client of
/// its demanda.
async fn load_visible(state: &AppState, actor: &Actor, id: Uuid) -> ApiResult<Offer> {
    let offer = state
        .store
        .find_offer(id)
        .await?
        .ok_or(ApiError::NotFound("offer"))?;
    let demanda = state
        .store
        .find_demanda(offer.demanda_id)
        .await?
        .ok_or(ApiError::NotFound("offer"))?;

    if lifecycle::can_view_offer(actor, &offer, &demanda) {
        Ok(offer)
    } else {
        Err(ApiError::NotFound("offer"))
    }
}

/// GET /api/v1/offers/
pub async fn list_offers(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<OfferView>>> {
    let offers = state
        .store
        .list_offers(OfferScope::for_actor(&user.actor()))
        .await?;

    let mut views = Vec::with_capacity(offers.len());
    for offer in offers {
        views.push(offer_view(&state, offer).await?);
    }
    Ok(Json(views))
}

/// POST /api/v1/offers/
pub async fn create_offer(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateOfferRequest>,
) -> ApiResult<(StatusCode, Json<OfferView>)> {
    let actor = user.actor();
    if !actor.is_professional() {
        return Err(ApiError::Forbidden(
            "Only professionals can make offers".to_string(),
        ));
    }

    let new = NewOffer {
        demanda_id: payload.demanda,
        value_cents: validate::value_to_cents(payload.value)?,
        term: validate::validate_term(&payload.term)?,
    };
    let offer = state.store.create_offer(actor, new).await?;

    tracing::info!(
        offer_id = %offer.id,
        demanda_id = %offer.demanda_id,
        professional_id = %actor.id,
        value_cents = offer.value_cents,
        "offer created"
    );

    Ok((StatusCode::CREATED, Json(offer_view(&state, offer).await?)))
}

/// GET /api/v1/offers/{id}/
pub async fn get_offer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OfferView>> {
    let offer = load_visible(&state, &user.actor(), id).await?;
    Ok(Json(offer_view(&state, offer).await?))
}

/// PUT|PATCH /api/v1/offers/{id}/
/// Offers are immutable once made.
pub async fn update_offer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OfferView>> {
    let offer = load_visible(&state, &user.actor(), id).await?;
    lifecycle::ensure_can_edit_offer()?;
    Ok(Json(offer_view(&state, offer).await?))
}

/// DELETE /api/v1/offers/{id}/
pub async fn withdraw_offer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = user.actor();
    let offer = load_visible(&state, &actor, id).await?;
    state.store.withdraw_offer(actor, id).await?;

    tracing::info!(
        offer_id = %id,
        demanda_id = %offer.demanda_id,
        professional_id = %actor.id,
        "offer withdrawn"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/offers/{id}/accept/
pub async fn accept_offer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OfferView>> {
    let actor = user.actor();
    load_visible(&state, &actor, id).await?;
    let offer = state.store.accept_offer(actor, id).await?;

    tracing::info!(
        offer_id = %offer.id,
        demanda_id = %offer.demanda_id,
        client_id = %actor.id,
        professional_id = %offer.professional_id,
        "offer accepted, demanda in progress"
    );

    Ok(Json(offer_view(&state, offer).await?))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{create_demanda, create_offer, register, send, test_app};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    fn offer_uri(offer: &serde_json::Value) -> String {
        format!("/api/v1/offers/{}/", offer["id"].as_str().unwrap())
    }

    #[tokio::test]
    async fn test_create_offer_returns_read_model() {
        let (app, _) = test_app().await;
        let ana = register(&app, "ana@example.com", false).await;
        let pro = register(&app, "pro@example.com", true).await;
        let demanda = create_demanda(&app, &ana, "Pintar a sala").await;

        let offer = create_offer(&app, &pro, demanda["id"].as_str().unwrap(), 249.9).await;
        assert_eq!(offer["status"], "pending");
        assert_eq!(offer["value"], 249.9);
        assert_eq!(offer["term"], "3 dias");
        assert_eq!(offer["professionalName"], "pro@example.com");
        assert_eq!(offer["demandaClientName"], "ana@example.com");
    }

    #[tokio::test]
    async fn test_offer_creation_rules() {
        let (app, _) = test_app().await;
        let ana = register(&app, "ana@example.com", false).await;
        let pro = register(&app, "pro@example.com", true).await;
        let demanda = create_demanda(&app, &ana, "Pintar a sala").await;
        let demanda_id = demanda["id"].as_str().unwrap();

        // Clients cannot offer.
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/offers/",
            Some(&ana.token),
            Some(json!({ "demanda": demanda_id, "value": 100.0, "term": "1 dia" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Value must be positive.
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/offers/",
            Some(&pro.token),
            Some(json!({ "demanda": demanda_id, "value": 0.0, "term": "1 dia" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        create_offer(&app, &pro, demanda_id, 100.0).await;

        // One offer per professional and demanda.
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/offers/",
            Some(&pro.token),
            Some(json!({ "demanda": demanda_id, "value": 90.0, "term": "1 dia" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/offers/",
            Some(&pro.token),
            Some(json!({ "demanda": uuid::Uuid::new_v4(), "value": 90.0, "term": "1 dia" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_accept_rejects_siblings_and_closes_demanda() {
        let (app, _) = test_app().await;
        let ana = register(&app, "ana@example.com", false).await;
        let p1 = register(&app, "p1@example.com", true).await;
        let p2 = register(&app, "p2@example.com", true).await;
        let p3 = register(&app, "p3@example.com", true).await;
        let demanda = create_demanda(&app, &ana, "Pintar a sala").await;
        let demanda_id = demanda["id"].as_str().unwrap();

        let o1 = create_offer(&app, &p1, demanda_id, 300.0).await;
        let o2 = create_offer(&app, &p2, demanda_id, 280.0).await;

        // The professional who made the offer cannot accept it.
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("{}accept/", offer_uri(&o1)),
            Some(&p1.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, accepted) = send(
            &app,
            Method::POST,
            &format!("{}accept/", offer_uri(&o1)),
            Some(&ana.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(accepted["status"], "accepted");

        let (_, sibling) = send(&app, Method::GET, &offer_uri(&o2), Some(&p2.token), None).await;
        assert_eq!(sibling["status"], "rejected");

        let (_, demanda) = send(
            &app,
            Method::GET,
            &format!("/api/v1/demandas/{}/", demanda_id),
            Some(&ana.token),
            None,
        )
        .await;
        assert_eq!(demanda["status"], "in_progress");
        assert_eq!(demanda["professional"], p1.id.to_string());
        assert_eq!(demanda["professionalName"], "p1@example.com");
        assert_eq!(demanda["acceptedOfferValue"], 300.0);

        // Neither the rejected offer nor a second acceptance goes through.
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("{}accept/", offer_uri(&o2)),
            Some(&ana.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("{}accept/", offer_uri(&o1)),
            Some(&ana.token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // The demanda is no longer open for offers.
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/offers/",
            Some(&p3.token),
            Some(json!({ "demanda": demanda_id, "value": 10.0, "term": "1 dia" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_listing_and_visibility() {
        let (app, _) = test_app().await;
        let ana = register(&app, "ana@example.com", false).await;
        let bia = register(&app, "bia@example.com", false).await;
        let p1 = register(&app, "p1@example.com", true).await;
        let p2 = register(&app, "p2@example.com", true).await;
        let d1 = create_demanda(&app, &ana, "Pintar a sala").await;
        let d2 = create_demanda(&app, &bia, "Pintar o muro").await;

        let o1 = create_offer(&app, &p1, d1["id"].as_str().unwrap(), 100.0).await;
        create_offer(&app, &p1, d2["id"].as_str().unwrap(), 120.0).await;
        create_offer(&app, &p2, d1["id"].as_str().unwrap(), 110.0).await;

        let (_, p1_offers) = send(&app, Method::GET, "/api/v1/offers/", Some(&p1.token), None).await;
        assert_eq!(p1_offers.as_array().unwrap().len(), 2);
        let (_, ana_offers) = send(&app, Method::GET, "/api/v1/offers/", Some(&ana.token), None).await;
        assert_eq!(ana_offers.as_array().unwrap().len(), 2);
        let (_, bia_offers) = send(&app, Method::GET, "/api/v1/offers/", Some(&bia.token), None).await;
        assert_eq!(bia_offers.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Method::GET, &offer_uri(&o1), Some(&ana.token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::GET, &offer_uri(&o1), Some(&p2.token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::GET, &offer_uri(&o1), Some(&bia.token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_offers_cannot_be_edited() {
        let (app, _) = test_app().await;
        let ana = register(&app, "ana@example.com", false).await;
        let pro = register(&app, "pro@example.com", true).await;
        let demanda = create_demanda(&app, &ana, "Pintar a sala").await;
        let offer = create_offer(&app, &pro, demanda["id"].as_str().unwrap(), 100.0).await;

        for method in [Method::PUT, Method::PATCH] {
            let (status, _) = send(
                &app,
                method,
                &offer_uri(&offer),
                Some(&pro.token),
                Some(json!({ "value": 1.0 })),
            )
            .await;
            assert_eq!(status, StatusCode::FORBIDDEN);
        }
    }

    #[tokio::test]
    async fn test_withdraw_pending_offer_only() {
        let (app, _) = test_app().await;
        let ana = register(&app, "ana@example.com", false).await;
        let p1 = register(&app, "p1@example.com", true).await;
        let p2 = register(&app, "p2@example.com", true).await;
        let demanda = create_demanda(&app, &ana, "Pintar a sala").await;
        let demanda_id = demanda["id"].as_str().unwrap();
        let o1 = create_offer(&app, &p1, demanda_id, 100.0).await;
        let o2 = create_offer(&app, &p2, demanda_id, 120.0).await;

        // The client sees the offer but cannot withdraw it.
        let (status, _) = send(&app, Method::DELETE, &offer_uri(&o2), Some(&ana.token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, Method::DELETE, &offer_uri(&o2), Some(&p2.token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &offer_uri(&o2), Some(&p2.token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(
            &app,
            Method::POST,
            &format!("{}accept/", offer_uri(&o1)),
            Some(&ana.token),
            None,
        )
        .await;
        let (status, _) = send(&app, Method::DELETE, &offer_uri(&o1), Some(&p1.token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_client_turned_professional_cannot_offer_on_own_demanda() {
        let (app, _) = test_app().await;
        let ana = register(&app, "ana@example.com", false).await;
        let demanda = create_demanda(&app, &ana, "Consertar o chuveiro").await;

        let (status, _) = send(
            &app,
            Method::PATCH,
            "/api/v1/accounts/perfil/me/",
            Some(&ana.token),
            Some(json!({ "isProfessional": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/offers/",
            Some(&ana.token),
            Some(json!({ "demanda": demanda["id"], "value": 80.0, "term": "1 dia" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");
    }
}
