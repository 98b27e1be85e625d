//! Vagali Backend - services marketplace API (library for app logic and testing)

pub mod db;
pub mod error;
pub mod logging;
pub mod marketplace;
pub mod routes;
pub mod state;
pub mod store;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use crate::routes::{accounts, auth, demandas, feedback, health, offers, services};
use crate::state::AppState;
use crate::store::{MarketplaceStore, MemoryStore, PgStore, StoreError, DEFAULT_SERVICES};

/// Why the server could not start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN, falling back to
/// the local frontend dev server.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:3000"),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/accounts/register/", post(accounts::register))
        .route(
            "/accounts/perfil/me/",
            get(accounts::me)
                .put(accounts::update_me)
                .patch(accounts::update_me),
        )
        .route("/accounts/profissionais/", get(accounts::list_professionals))
        .route(
            "/accounts/profissionais/{id}/",
            get(accounts::get_professional),
        )
        .route("/auth/login/", post(auth::login))
        .route("/auth/verify/", post(auth::verify_token))
        .route("/services/", get(services::list_services))
        .route("/services/{id}/", get(services::get_service))
        .route(
            "/demandas/",
            get(demandas::list_demandas).post(demandas::create_demanda),
        )
        .route(
            "/demandas/{id}/",
            get(demandas::get_demanda)
                .put(demandas::update_demanda)
                .patch(demandas::update_demanda)
                .delete(demandas::delete_demanda),
        )
        .route("/demandas/{id}/concluir/", post(demandas::conclude_demanda))
        .route("/offers/", get(offers::list_offers).post(offers::create_offer))
        .route(
            "/offers/{id}/",
            get(offers::get_offer)
                .put(offers::update_offer)
                .patch(offers::update_offer)
                .delete(offers::withdraw_offer),
        )
        .route("/offers/{id}/accept/", post(offers::accept_offer))
        .route(
            "/feedback/",
            get(feedback::list_feedback).post(feedback::create_feedback),
        )
        .route("/feedback/{id}/", get(feedback::get_feedback))
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors();

    Router::new()
        .nest("/api/v1", api_routes())
        .route("/health", get(health::health_ping))
        .route("/health/detailed", get(health::health_detailed))
        .route("/health/ready", get(health::health_ready))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        // Global 2 MB request body cap
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024))
        .layer(cors)
        .with_state(state)
}

/// Picks the store: Postgres when `DATABASE_URL` is set, otherwise memory.
async fn open_store() -> Result<Arc<dyn MarketplaceStore>, StartupError> {
    match db::DbConfig::from_env() {
        Some(config) => {
            let pool = db::init_pool(&config).await?;
            db::run_migrations(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set. Running on the in-memory store; data is lost on restart."
            );
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn check_production_secrets(config: &logging::LogConfig) -> Result<(), StartupError> {
    if config.is_production() && auth::JWT_SECRET.as_str() == auth::DEFAULT_JWT_SECRET {
        return Err(StartupError::Config(
            "JWT_SECRET must be set to a secure, unique value in production".to_string(),
        ));
    }
    Ok(())
}

/// Run the server (used by main).
pub async fn run() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();

    let log_config = logging::LogConfig::from_env();
    // Dropping the guards stops the background writers and loses buffered lines.
    let _log_guards = logging::init(&log_config);

    check_production_secrets(&log_config)?;

    let store = open_store().await?;
    let seeded = store.seed_services(DEFAULT_SERVICES).await?;
    tracing::info!(backend = store.backend(), seeded, "service catalog ready");

    let app = create_app(AppState::new(store));

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3001);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| StartupError::Config(format!("invalid HOST/PORT: {}", e)))?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_app_returns_router() {
        let _app = create_app(AppState::in_memory());
    }

    #[test]
    fn test_production_refuses_default_secret() {
        let config = logging::LogConfig {
            environment: "production".to_string(),
            level: "info".to_string(),
            dir: "logs".into(),
        };
        // Tests never set JWT_SECRET, so the default is in effect.
        if auth::JWT_SECRET.as_str() == auth::DEFAULT_JWT_SECRET {
            assert!(matches!(
                check_production_secrets(&config),
                Err(StartupError::Config(_))
            ));
        }

        let dev = logging::LogConfig {
            environment: "development".to_string(),
            ..config
        };
        assert!(check_production_secrets(&dev).is_ok());
    }
}
