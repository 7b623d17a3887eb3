use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use sha2::{Digest, Sha256};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::errors::AppError;
use crate::AppState;

pub mod accounts;
pub mod audit_log;
pub mod auth;
pub mod env_vars;
pub mod integrations;
pub mod packages;
pub mod projects;
pub mod services;
pub mod teams;

/// Build the management API router. The caller mounts this under `/api/v1`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/tokens", post(auth::mint_token))
        .route("/projects", get(projects::list).post(projects::create))
        .route(
            "/projects/:id",
            get(projects::get).patch(projects::update).delete(projects::remove),
        )
        .route("/projects/:id/graph", get(projects::graph))
        .route("/projects/:id/export", post(packages::export))
        .route("/projects/:id/install", post(packages::install))
        .route("/services", get(services::catalog))
        .route(
            "/projects/:id/services",
            get(services::list).post(services::attach),
        )
        .route(
            "/projects/:id/services/:ps_id",
            patch(services::update).delete(services::detach),
        )
        .route(
            "/projects/:id/connections",
            get(services::list_connections).post(services::create_connection),
        )
        .route(
            "/projects/:id/connections/:conn_id",
            delete(services::delete_connection),
        )
        .route("/projects/:id/env", get(env_vars::list))
        .route("/projects/:id/env/bulk", post(env_vars::bulk_create))
        .route(
            "/projects/:id/env/:var_id",
            patch(env_vars::update).delete(env_vars::remove),
        )
        .route("/projects/:id/env/:var_id/decrypt", post(env_vars::decrypt))
        .route(
            "/projects/:id/accounts",
            get(accounts::list).post(accounts::connect_api_key),
        )
        .route("/projects/:id/accounts/:account_id", delete(accounts::remove))
        .route("/packages", get(packages::list).post(packages::publish))
        .route("/packages/:slug", get(packages::get))
        .route("/oauth/github/start", post(integrations::oauth_start))
        .route("/oauth/github/callback", get(integrations::oauth_callback))
        .route(
            "/projects/:id/repos",
            get(integrations::list_repos).post(integrations::link_repo),
        )
        .route("/projects/:id/deploy", post(integrations::deploy))
        .route("/teams", post(teams::create))
        .route("/teams/:id", get(teams::get))
        .route("/teams/:id/members", post(teams::add_member))
        .route("/audit", get(audit_log::list))
        .layer(TraceLayer::new_for_http())
}

/// The authenticated actor, resolved from a bearer session token. Handlers
/// take this as an extractor; its absence is `Unauthorized` before any work
/// happens.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        let user_id = state
            .db
            .session_user(&hash_token(token))
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(Actor { user_id })
    }
}

/// Session tokens are stored hashed; a leaked database does not leak usable
/// tokens.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn generate_session_token() -> String {
    use aes_gcm::aead::OsRng;
    use rand::RngCore;
    let mut bytes = [0u8; 24];
    OsRng.fill_bytes(&mut bytes);
    format!("slt_{}", hex::encode(bytes))
}

// ── Shared validation helpers ────────────────────────────────

pub(crate) fn require_non_empty(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field}: must not be empty")));
    }
    if trimmed.len() > max {
        return Err(AppError::Validation(format!(
            "{field}: must be at most {max} characters"
        )));
    }
    Ok(())
}

/// tech_stack is an opaque string→string mapping; anything else is rejected
/// at the boundary.
pub(crate) fn validate_tech_stack(value: &serde_json::Value) -> Result<(), AppError> {
    let obj = value.as_object().ok_or_else(|| {
        AppError::Validation("tech_stack: must be an object".to_string())
    })?;
    for (key, val) in obj {
        if !val.is_string() {
            return Err(AppError::Validation(format!(
                "tech_stack.{key}: must be a string"
            )));
        }
    }
    Ok(())
}
