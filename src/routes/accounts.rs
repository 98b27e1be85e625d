/**
 * Account Routes
 * Registration, own profile and the public professional directory
 */
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::{hash_password, CurrentUser};
use super::SearchQuery;
use crate::error::{ApiError, ApiResult};
use crate::marketplace::{
    validate, Account, AccountUpdate, NewAccount, ProfessionalStats, Profile, ProfilePatch, Role,
};
use crate::state::AppState;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_professional: bool,
    pub full_name: Option<String>,
    pub cpf: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub is_professional: Option<bool>,
    pub profile: Option<ProfilePatch>,
}

/// Account plus profile and, for professionals, their reputation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: Uuid,
    pub email: String,
    pub is_professional: bool,
    pub role: Role,
    pub date_joined: DateTime<Utc>,
    pub profile: Profile,
    pub rating: f64,
    pub feedback_count: i64,
    pub demands_completed: i64,
}

/// Public directory entry; personal contact and document fields stay out.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalSummary {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub servico_principal: String,
    pub cidade: String,
    pub rating: f64,
}

async fn profile_view(state: &AppState, account: Account) -> ApiResult<ProfileView> {
    let stats = if account.user.is_professional {
        state.store.professional_stats(account.user.id).await?
    } else {
        ProfessionalStats::default()
    };

    Ok(ProfileView {
        id: account.user.id,
        email: account.user.email.clone(),
        is_professional: account.user.is_professional,
        role: account.user.role(),
        date_joined: account.user.date_joined,
        profile: account.profile,
        rating: stats.rating,
        feedback_count: stats.feedback_count,
        demands_completed: stats.demands_completed,
    })
}

/// POST /api/v1/accounts/register/
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ProfileView>)> {
    let email = validate::validate_email(&payload.email)?;
    validate::validate_password(&payload.password)?;

    if state.store.find_account_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let password_hash = hash_password(payload.password).await?;

    let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).unwrap_or_default();
    let profile = Profile {
        full_name: clean(payload.full_name),
        cpf: clean(payload.cpf),
        phone_number: clean(payload.phone_number),
        ..Profile::default()
    };

    // The store's unique email constraint still catches a concurrent duplicate.
    let account = state
        .store
        .create_account(NewAccount {
            email,
            password_hash,
            is_professional: payload.is_professional,
            profile,
        })
        .await?;

    tracing::info!(
        user_id = %account.user.id,
        role = %account.user.role(),
        "account registered"
    );

    Ok((StatusCode::CREATED, Json(profile_view(&state, account).await?)))
}

/// GET /api/v1/accounts/perfil/me/
pub async fn me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<ProfileView>> {
    Ok(Json(profile_view(&state, user.0).await?))
}

/// PUT|PATCH /api/v1/accounts/perfil/me/
pub async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<UpdateMeRequest>,
) -> ApiResult<Json<ProfileView>> {
    let previous_role = user.0.user.role();
    let account = state
        .store
        .update_account(
            user.id(),
            AccountUpdate {
                is_professional: payload.is_professional,
                profile: payload.profile,
            },
        )
        .await?;

    if account.user.role() != previous_role {
        tracing::info!(
            user_id = %account.user.id,
            from = %previous_role,
            to = %account.user.role(),
            "account role changed"
        );
    }

    Ok(Json(profile_view(&state, account).await?))
}

/// GET /api/v1/accounts/profissionais/?search=
pub async fn list_professionals(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<ProfessionalSummary>>> {
    let accounts = state.store.list_professionals(&query.term()).await?;
    let mut summaries = Vec::with_capacity(accounts.len());
    for account in accounts {
        let stats = state.store.professional_stats(account.user.id).await?;
        summaries.push(ProfessionalSummary {
            id: account.user.id,
            full_name: account.display_name(),
            email: account.user.email,
            servico_principal: account.profile.servico_principal,
            cidade: account.profile.cidade,
            rating: stats.rating,
        });
    }
    Ok(Json(summaries))
}

/// GET /api/v1/accounts/profissionais/{id}/
pub async fn get_professional(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProfileView>> {
    let account = state
        .store
        .find_account(id)
        .await?
        .filter(|a| a.user.is_professional)
        .ok_or(ApiError::NotFound("professional"))?;
    Ok(Json(profile_view(&state, account).await?))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{create_demanda, register, send, test_app, PASSWORD};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_register_returns_profile() {
        let (app, _) = test_app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/accounts/register/",
            None,
            Some(json!({
                "email": "ana@example.com",
                "password": PASSWORD,
                "fullName": "  Ana Souza ",
                "cpf": "123.456.789-00",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["isProfessional"], false);
        assert_eq!(body["role"], "client");
        assert_eq!(body["profile"]["fullName"], "Ana Souza");
        assert_eq!(body["profile"]["cpf"], "123.456.789-00");
        assert!(body.get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn test_register_duplicate_email_is_conflict() {
        let (app, _) = test_app().await;
        register(&app, "ana@example.com", false).await;
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/accounts/register/",
            None,
            Some(json!({ "email": "ANA@example.com", "password": PASSWORD })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_register_short_password_is_bad_request() {
        let (app, _) = test_app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/accounts/register/",
            None,
            Some(json!({ "email": "ana@example.com", "password": "short" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let (app, _) = test_app().await;
        let (status, _) = send(&app, Method::GET, "/api/v1/accounts/perfil/me/", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_switching_role_clears_professional_fields() {
        let (app, _) = test_app().await;
        let pro = register(&app, "pro@example.com", true).await;

        let (status, body) = send(
            &app,
            Method::PATCH,
            "/api/v1/accounts/perfil/me/",
            Some(&pro.token),
            Some(json!({ "profile": { "servicoPrincipal": "Pintor", "cnpj": "12345678000199" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["servicoPrincipal"], "Pintor");

        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/v1/accounts/perfil/me/",
            Some(&pro.token),
            Some(json!({ "isProfessional": false, "profile": { "bio": "Agora cliente" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isProfessional"], false);
        assert_eq!(body["profile"]["servicoPrincipal"], "");
        assert_eq!(body["profile"]["cnpj"], "");
        assert_eq!(body["profile"]["bio"], "Agora cliente");

        // The new role applies to the very next request with the same token.
        create_demanda(&app, &pro, "Pintar a cozinha").await;
        let (_, me) = send(
            &app,
            Method::GET,
            "/api/v1/accounts/perfil/me/",
            Some(&pro.token),
            None,
        )
        .await;
        assert_eq!(me["role"], "client");
    }

    #[tokio::test]
    async fn test_professional_directory_lists_and_searches_professionals() {
        let (app, _) = test_app().await;
        let client = register(&app, "cliente@example.com", false).await;
        let pro = register(&app, "joao@example.com", true).await;
        register(&app, "maria@example.com", true).await;

        send(
            &app,
            Method::PATCH,
            "/api/v1/accounts/perfil/me/",
            Some(&pro.token),
            Some(json!({ "profile": { "fullName": "João Pintor", "cidade": "Campinas" } })),
        )
        .await;

        let (status, body) =
            send(&app, Method::GET, "/api/v1/accounts/profissionais/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = send(
            &app,
            Method::GET,
            "/api/v1/accounts/profissionais/?search=campinas",
            None,
            None,
        )
        .await;
        let found = body.as_array().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], pro.id.to_string());
        assert_eq!(found[0]["fullName"], "João Pintor");
        assert_eq!(found[0]["cidade"], "Campinas");
        assert_eq!(found[0]["rating"], 0.0);

        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/api/v1/accounts/profissionais/{}/", client.id),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/v1/accounts/profissionais/{}/", pro.id),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["fullName"], "João Pintor");
    }

    #[tokio::test]
    async fn test_professional_directory_hides_personal_fields() {
        let (app, _) = test_app().await;
        let pro = register(&app, "pro@example.com", true).await;
        send(
            &app,
            Method::PATCH,
            "/api/v1/accounts/perfil/me/",
            Some(&pro.token),
            Some(json!({ "profile": {
                "cpf": "12345678900",
                "phoneNumber": "11999990000",
                "address": "Rua X 10",
                "cnpj": "12345678000199",
                "servicoPrincipal": "Eletricista",
            } })),
        )
        .await;

        let (status, body) =
            send(&app, Method::GET, "/api/v1/accounts/profissionais/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let entry = &body.as_array().unwrap()[0];
        assert_eq!(entry["servicoPrincipal"], "Eletricista");
        for field in ["cpf", "phoneNumber", "address", "cnpj", "profile"] {
            assert!(entry.get(field).is_none(), "{} exposed: {}", field, entry);
        }
    }
}
