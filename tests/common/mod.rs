//! Shared harness: a full router over an in-memory database, exercised with
//! `tower::ServiceExt::oneshot` so no listener is needed.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use setlog::config::Config;
use setlog::{build_state, AppState};

pub const TEST_MASTER_KEY: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

pub fn test_config() -> Config {
    Config {
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        master_key: TEST_MASTER_KEY.to_string(),
        public_base_url: "http://localhost:8090".to_string(),
        github_client_id: "test-client".to_string(),
        github_client_secret: "test-secret".to_string(),
        github_api_base: "http://127.0.0.1:1".to_string(),
        github_oauth_base: "http://127.0.0.1:1".to_string(),
        vercel_api_base: "http://127.0.0.1:1".to_string(),
        write_rate_limit: 10_000,
        decrypt_rate_limit: 10_000,
    }
}

pub async fn test_state(config: Config) -> Arc<AppState> {
    Arc::new(build_state(config).await.unwrap())
}

pub async fn test_app() -> (Router, Arc<AppState>) {
    let state = test_state(test_config()).await;
    (app_for(state.clone()), state)
}

pub fn app_for(state: Arc<AppState>) -> Router {
    setlog::api::api_router().with_state(state)
}

/// Fire one request and parse the JSON body (empty bodies become Null).
pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Register a user and return their session token.
pub async fn register(app: &Router, email: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/auth/register",
        None,
        Some(serde_json::json!({ "email": email })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

/// Create a project and return its id.
pub async fn create_project(app: &Router, token: &str, name: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/projects",
        Some(token),
        Some(serde_json::json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create project failed: {body}");
    body["id"].as_str().unwrap().to_string()
}

/// Attach a catalog service; returns the project_service id.
pub async fn attach_service(app: &Router, token: &str, project_id: &str, slug: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        &format!("/projects/{project_id}/services"),
        Some(token),
        Some(serde_json::json!({ "service_slug": slug })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "attach failed: {body}");
    body["id"].as_str().unwrap().to_string()
}
