/**
 * Authentication Routes
 * JWT login, token verification and the bearer-token extractor
 */
use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap},
    Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::marketplace::{Account, Actor, User};
use crate::state::AppState;

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

lazy_static::lazy_static! {
    /// JWT secret key from environment
    pub static ref JWT_SECRET: String = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string());

    /// Access token lifetime in hours
    static ref ACCESS_TOKEN_EXPIRY_HOURS: i64 = std::env::var("ACCESS_TOKEN_EXPIRY_HOURS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(24);

    /// bcrypt work factor for new password hashes
    static ref BCRYPT_COST: u32 = std::env::var("BCRYPT_COST")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_COST);
}

// ============================================================================
// Types
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,   // User ID
    pub email: String, // User email
    pub role: String,  // Role at issue time; authorization re-reads it from the store
    pub exp: i64,      // Expiry timestamp
    pub iat: i64,      // Issued at timestamp
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user_id: Uuid,
    pub is_professional: bool,
    pub email: String,
}

/// User info returned to frontend
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub user_id: Uuid,
    pub email: String,
    pub is_professional: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Helper Functions
// ============================================================================

pub fn create_access_token(user: &User) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::hours(*ACCESS_TOKEN_EXPIRY_HOURS);

    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role().to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
}

/// Verify and decode access token
pub fn verify_access_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Lowest cost bcrypt accepts; keeps unit tests fast.
const TEST_BCRYPT_COST: u32 = 4;

fn bcrypt_cost() -> u32 {
    if cfg!(test) {
        TEST_BCRYPT_COST
    } else {
        *BCRYPT_COST
    }
}

/// Hash a password off the async executor; bcrypt is CPU-bound.
pub async fn hash_password(password: String) -> ApiResult<String> {
    let cost = bcrypt_cost();
    match tokio::task::spawn_blocking(move || hash(password, cost)).await {
        Ok(Ok(h)) => Ok(h),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to hash password");
            Err(ApiError::Internal)
        }
        Err(e) => {
            tracing::error!(error = %e, "password hashing task failed");
            Err(ApiError::Internal)
        }
    }
}

async fn verify_password(password: String, password_hash: String) -> ApiResult<bool> {
    match tokio::task::spawn_blocking(move || verify(password, &password_hash)).await {
        Ok(Ok(valid)) => Ok(valid),
        Ok(Err(e)) => {
            // A malformed stored hash never matches.
            tracing::warn!(error = %e, "password verification error");
            Ok(false)
        }
        Err(e) => {
            tracing::error!(error = %e, "password verification task failed");
            Err(ApiError::Internal)
        }
    }
}

/// Resolves the bearer token to the current account. The role comes from
/// storage, not from the token, because it can change after login.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<Account> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided"))?;

    let claims = verify_access_token(token).map_err(|e| {
        tracing::debug!(error = %e, "rejected access token");
        ApiError::unauthorized("Invalid or expired token")
    })?;

    let user_id: Uuid = claims
        .sub
        .parse()
        .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;

    state
        .store
        .find_account(user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Account);

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        self.0.user.actor()
    }

    pub fn id(&self) -> Uuid {
        self.0.user.id
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(state, &parts.headers).await.map(CurrentUser)
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/auth/login/
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let email = payload.email.trim();
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    let account = state.store.find_account_by_email(email).await?;
    let Some(account) = account else {
        tracing::warn!(email = %email, "login attempt for unknown email");
        return Err(ApiError::unauthorized("Invalid credentials"));
    };

    let valid = verify_password(payload.password, account.user.password_hash.clone()).await?;
    if !valid {
        tracing::warn!(user_id = %account.user.id, "login attempt with wrong password");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = create_access_token(&account.user).map_err(|e| {
        tracing::error!(error = %e, "failed to sign access token");
        ApiError::Internal
    })?;

    tracing::info!(user_id = %account.user.id, "user logged in");

    Ok(Json(LoginResponse {
        token,
        user_id: account.user.id,
        is_professional: account.user.is_professional,
        email: account.user.email,
    }))
}

/// POST /api/v1/auth/verify/
/// Always answers 200; the body says whether the token is usable.
pub async fn verify_token(State(state): State<AppState>, headers: HeaderMap) -> Json<VerifyResponse> {
    match authenticate(&state, &headers).await {
        Ok(account) => Json(VerifyResponse {
            is_valid: true,
            user: Some(UserInfo {
                user_id: account.user.id,
                email: account.user.email,
                is_professional: account.user.is_professional,
            }),
            error: None,
        }),
        Err(e) => Json(VerifyResponse {
            is_valid: false,
            user: None,
            error: Some(e.to_string()),
        }),
    }
}
