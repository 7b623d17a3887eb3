//! Connections between attached services, api-key accounts, teams, and the
//! write rate limit.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{app_for, attach_service, call, create_project, register, test_app, test_config, test_state};

#[tokio::test]
async fn connection_lifecycle_and_conflicts() {
    let (app, _state) = test_app().await;
    let token = register(&app, "alice@example.com").await;
    let project_id = create_project(&app, &token, "Wired").await;
    let stripe = attach_service(&app, &token, &project_id, "stripe").await;
    let supabase = attach_service(&app, &token, &project_id, "supabase").await;

    let uri = format!("/projects/{project_id}/connections");
    let payload = json!({
        "source_id": stripe,
        "target_id": supabase,
        "kind": "data_transfer",
        "label": "webhooks",
    });

    let (status, created) = call(&app, "POST", &uri, Some(&token), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let conn_id = created["id"].as_str().unwrap().to_string();

    // Same edge again: conflict, not a duplicate row.
    let (status, body) = call(&app, "POST", &uri, Some(&token), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    // Same endpoints, different kind: allowed.
    let mut other_kind = payload.clone();
    other_kind["kind"] = json!("uses");
    let (status, _) = call(&app, "POST", &uri, Some(&token), Some(other_kind)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, listing) = call(&app, "GET", &uri, Some(&token), None).await;
    assert_eq!(listing.as_array().unwrap().len(), 2);

    let (status, _) = call(
        &app,
        "DELETE",
        &format!("{uri}/{conn_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn self_loops_are_rejected_before_any_write() {
    let (app, _state) = test_app().await;
    let token = register(&app, "alice@example.com").await;
    let project_id = create_project(&app, &token, "Loopy").await;
    let stripe = attach_service(&app, &token, &project_id, "stripe").await;

    let (status, body) = call(
        &app,
        "POST",
        &format!("/projects/{project_id}/connections"),
        Some(&token),
        Some(json!({ "source_id": stripe, "target_id": stripe, "kind": "uses" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_failed");

    let (_, listing) = call(
        &app,
        "GET",
        &format!("/projects/{project_id}/connections"),
        Some(&token),
        None,
    )
    .await;
    assert!(listing.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn connection_endpoints_must_belong_to_the_project() {
    let (app, _state) = test_app().await;
    let token = register(&app, "alice@example.com").await;
    let project_a = create_project(&app, &token, "A").await;
    let project_b = create_project(&app, &token, "B").await;
    let in_a = attach_service(&app, &token, &project_a, "stripe").await;
    let in_b = attach_service(&app, &token, &project_b, "supabase").await;

    let (status, _) = call(
        &app,
        "POST",
        &format!("/projects/{project_a}/connections"),
        Some(&token),
        Some(json!({ "source_id": in_a, "target_id": in_b, "kind": "uses" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_service_attachment_conflicts() {
    let (app, _state) = test_app().await;
    let token = register(&app, "alice@example.com").await;
    let project_id = create_project(&app, &token, "Doubled").await;
    attach_service(&app, &token, &project_id, "stripe").await;

    let (status, body) = call(
        &app,
        "POST",
        &format!("/projects/{project_id}/services"),
        Some(&token),
        Some(json!({ "service_slug": "stripe" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn unknown_catalog_slug_is_a_validation_error() {
    let (app, _state) = test_app().await;
    let token = register(&app, "alice@example.com").await;
    let project_id = create_project(&app, &token, "Typo").await;

    let (status, _) = call(
        &app,
        "POST",
        &format!("/projects/{project_id}/services"),
        Some(&token),
        Some(json!({ "service_slug": "no-such-service" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn api_key_account_connect_and_remove() {
    let (app, _state) = test_app().await;
    let token = register(&app, "alice@example.com").await;
    let project_id = create_project(&app, &token, "Keyed").await;

    let (status, account) = call(
        &app,
        "POST",
        &format!("/projects/{project_id}/accounts"),
        Some(&token),
        Some(json!({
            "service_slug": "resend",
            "label": "prod key",
            "keys": { "RESEND_API_KEY": "re_secret_123" },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{account}");
    assert_eq!(account["kind"], "api_key");
    assert!(!account.to_string().contains("re_secret_123"));
    let account_id = account["id"].as_str().unwrap().to_string();

    // Reconnecting replaces the binding instead of duplicating it.
    let (status, again) = call(
        &app,
        "POST",
        &format!("/projects/{project_id}/accounts"),
        Some(&token),
        Some(json!({
            "service_slug": "resend",
            "keys": { "RESEND_API_KEY": "re_secret_456" },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(again["id"], account_id);

    let (_, listing) = call(
        &app,
        "GET",
        &format!("/projects/{project_id}/accounts"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(listing.as_array().unwrap().len(), 1);

    let (status, _) = call(
        &app,
        "DELETE",
        &format!("/projects/{project_id}/accounts/{account_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn account_delete_is_scoped_to_its_project() {
    let (app, _state) = test_app().await;
    let token = register(&app, "alice@example.com").await;
    let keyed = create_project(&app, &token, "Keyed").await;
    let other = create_project(&app, &token, "Other").await;

    let (_, account) = call(
        &app,
        "POST",
        &format!("/projects/{keyed}/accounts"),
        Some(&token),
        Some(json!({ "service_slug": "resend", "keys": { "RESEND_API_KEY": "re_1" } })),
    )
    .await;
    let account_id = account["id"].as_str().unwrap().to_string();

    // The same user's other project cannot reach the account.
    let (status, _) = call(
        &app,
        "DELETE",
        &format!("/projects/{other}/accounts/{account_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listing) = call(
        &app,
        "GET",
        &format!("/projects/{keyed}/accounts"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(listing.as_array().unwrap().len(), 1);

    // Through the owning project it deletes as usual.
    let (status, _) = call(
        &app,
        "DELETE",
        &format!("/projects/{keyed}/accounts/{account_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn team_membership_gates_visibility_and_management() {
    let (app, _state) = test_app().await;
    let alice = register(&app, "alice@example.com").await;
    let bob = register(&app, "bob@example.com").await;
    // Carol exists but is never added.
    register(&app, "carol@example.com").await;

    let (status, team) = call(
        &app,
        "POST",
        "/teams",
        Some(&alice),
        Some(json!({ "name": "Platform" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{team}");
    let team_id = team["id"].as_str().unwrap().to_string();

    // Outsiders cannot even see the team.
    let (status, _) = call(&app, "GET", &format!("/teams/{team_id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Owner adds bob as editor.
    let (status, _) = call(
        &app,
        "POST",
        &format!("/teams/{team_id}/members"),
        Some(&alice),
        Some(json!({ "email": "bob@example.com", "role": "editor" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Members see the roster.
    let (status, detail) = call(&app, "GET", &format!("/teams/{team_id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["members"].as_array().unwrap().len(), 2);

    // Editors cannot manage membership: the one true 403.
    let (status, body) = call(
        &app,
        "POST",
        &format!("/teams/{team_id}/members"),
        Some(&bob),
        Some(json!({ "email": "carol@example.com", "role": "viewer" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "insufficient_role");

    // Re-adding an existing member conflicts.
    let (status, _) = call(
        &app,
        "POST",
        &format!("/teams/{team_id}/members"),
        Some(&alice),
        Some(json!({ "email": "bob@example.com", "role": "viewer" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn write_rate_limit_returns_retry_after() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let mut config = test_config();
    config.write_rate_limit = 3;
    let state = test_state(config).await;
    let app = app_for(state);

    let token = register(&app, "alice@example.com").await;

    for i in 0..3 {
        let (status, body) = call(
            &app,
            "POST",
            "/projects",
            Some(&token),
            Some(json!({ "name": format!("proj-{i}") })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    let request = Request::builder()
        .method("POST")
        .uri("/projects")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "name": "over-limit" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get("retry-after").unwrap().to_str().unwrap(),
        "60"
    );
}
