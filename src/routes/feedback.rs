/**
 * Feedback Routes
 * Client ratings left after a demanda is completed
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
use crate::marketplace::{validate, Feedback, NewFeedback};
use crate::state::AppState;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeedbackRequest {
    pub demanda: Uuid,
    pub rating: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackView {
    pub id: Uuid,
    pub demanda: Uuid,
    pub client: Uuid,
    pub client_name: String,
    pub professional: Uuid,
    pub professional_name: String,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

async fn feedback_view(state: &AppState, feedback: Feedback) -> ApiResult<FeedbackView> {
    Ok(FeedbackView {
        id: feedback.id,
        demanda: feedback.demanda_id,
        client: feedback.client_id,
        client_name: display_name(state, feedback.client_id).await?,
        professional: feedback.professional_id,
        professional_name: display_name(state, feedback.professional_id).await?,
        rating: feedback.rating,
        comment: feedback.comment,
        created_at: feedback.created_at,
    })
}

/// GET /api/v1/feedback/
pub async fn list_feedback(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<FeedbackView>>> {
    let entries = state.store.list_feedback(user.id()).await?;
    let mut views = Vec::with_capacity(entries.len());
    for feedback in entries {
        views.push(feedback_view(&state, feedback).await?);
    }
    Ok(Json(views))
}

/// GET /api/v1/feedback/{id}/
pub async fn get_feedback(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FeedbackView>> {
    let feedback = state
        .store
        .find_feedback(id)
        .await?
        .filter(|f| f.client_id == user.id())
        .ok_or(ApiError::NotFound("feedback"))?;
    Ok(Json(feedback_view(&state, feedback).await?))
}

/// POST /api/v1/feedback/
pub async fn create_feedback(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateFeedbackRequest>,
) -> ApiResult<(StatusCode, Json<FeedbackView>)> {
    let actor = user.actor();
    let new = NewFeedback {
        demanda_id: payload.demanda,
        rating: validate::validate_rating(payload.rating)?,
        comment: payload
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
    };
    let feedback = state.store.create_feedback(actor, new).await?;

    tracing::info!(
        feedback_id = %feedback.id,
        demanda_id = %feedback.demanda_id,
        professional_id = %feedback.professional_id,
        rating = feedback.rating,
        "feedback recorded"
    );

    Ok((StatusCode::CREATED, Json(feedback_view(&state, feedback).await?)))
}
