//! Router-level helpers shared by the handler tests.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use crate::state::AppState;
use crate::store::DEFAULT_SERVICES;

pub(crate) const PASSWORD: &str = "password123";

pub(crate) struct TestUser {
    pub id: Uuid,
    pub token: String,
}

pub(crate) async fn test_app() -> (Router, AppState) {
    let state = AppState::in_memory();
    state.store.seed_services(DEFAULT_SERVICES).await.unwrap();
    (crate::create_app(state.clone()), state)
}

pub(crate) async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header("authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(json) => req
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Registers an account and logs it in.
pub(crate) async fn register(app: &Router, email: &str, is_professional: bool) -> TestUser {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/accounts/register/",
        None,
        Some(json!({
            "email": email,
            "password": PASSWORD,
            "isProfessional": is_professional,
            "fullName": "",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/auth/login/",
        None,
        Some(json!({ "email": email, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);

    TestUser {
        id: body["userId"].as_str().unwrap().parse().unwrap(),
        token: body["token"].as_str().unwrap().to_string(),
    }
}

pub(crate) async fn service_id(app: &Router, name: &str) -> Uuid {
    let (_, body) = send(app, Method::GET, "/api/v1/services/", None, None).await;
    body.as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == name)
        .and_then(|s| s["id"].as_str())
        .unwrap()
        .parse()
        .unwrap()
}

pub(crate) async fn create_demanda(app: &Router, client: &TestUser, title: &str) -> Value {
    let service = service_id(app, "Pintor").await;
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/demandas/",
        Some(&client.token),
        Some(json!({
            "service": service,
            "title": title,
            "description": "Pintar a sala e o corredor",
            "cep": "01001-000",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create demanda failed: {}", body);
    body
}

pub(crate) async fn create_offer(app: &Router, pro: &TestUser, demanda_id: &str, value: f64) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/offers/",
        Some(&pro.token),
        Some(json!({ "demanda": demanda_id, "value": value, "term": "3 dias" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create offer failed: {}", body);
    body
}
