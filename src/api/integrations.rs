use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::{require_non_empty, Actor};
use crate::bridge::github::GithubRepo;
use crate::bridge::oauth::{generate_state_token, STATE_TTL_MINUTES};
use crate::bridge::BridgeError;
use crate::errors::AppError;
use crate::models::account::{AccountKind, AccountStatus, NewServiceAccount};
use crate::models::audit::AuditEntry;
use crate::models::oauth::{Deployment, FlowContext, LinkedRepo};
use crate::AppState;

#[derive(Deserialize)]
pub struct OAuthStartRequest {
    pub project_id: Option<Uuid>,
    pub redirect_to: Option<String>,
    pub flow: FlowContext,
}

#[derive(Serialize)]
pub struct OAuthStartResponse {
    pub authorize_url: String,
    pub state: String,
}

/// POST /oauth/github/start — issue a single-use state token and hand the
/// client the provider authorize URL.
pub async fn oauth_start(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<OAuthStartRequest>,
) -> Result<Json<OAuthStartResponse>, AppError> {
    state.check_write_limit(actor.user_id)?;

    let project_id = match payload.flow {
        FlowContext::Project => {
            let pid = payload.project_id.ok_or_else(|| {
                AppError::Validation("project_id: required for project flow".to_string())
            })?;
            let project = state
                .db
                .get_project(pid, actor.user_id)
                .await?
                .ok_or(AppError::NotFound)?;
            Some(project.id)
        }
        FlowContext::Oneclick => None,
    };

    let token = generate_state_token();
    state
        .db
        .insert_oauth_state(
            &token,
            actor.user_id,
            project_id,
            "github",
            payload.redirect_to.as_deref(),
            payload.flow,
            STATE_TTL_MINUTES,
        )
        .await?;

    let redirect_uri = format!(
        "{}/api/v1/oauth/github/callback",
        state.config.public_base_url.trim_end_matches('/')
    );
    Ok(Json(OAuthStartResponse {
        authorize_url: state.github.authorize_url(&token, &redirect_uri),
        state: token,
    }))
}

#[derive(Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: String,
    pub state: String,
}

#[derive(Serialize)]
pub struct OAuthCallbackResponse {
    pub service_slug: String,
    pub provider_login: String,
    pub account_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

/// GET /oauth/github/callback — the provider redirects here. No bearer token
/// is present; the actor is whoever issued the state. Unknown, expired, or
/// replayed state fails closed as `NotFound`.
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Json<OAuthCallbackResponse>, AppError> {
    let flow = state
        .db
        .consume_oauth_state(&query.state)
        .await?
        .ok_or(AppError::NotFound)?;

    let access = state.github.exchange_code(&query.code).await?;
    let provider_user = state.github.get_user(&access.access_token).await?;
    let encrypted_token = state.vault.encrypt(&access.access_token)?;

    let account = state
        .db
        .upsert_service_account(NewServiceAccount {
            user_id: flow.user_id,
            project_id: flow.project_id,
            service_slug: flow.service_slug.clone(),
            kind: AccountKind::Oauth,
            label: Some(provider_user.login.clone()),
            encrypted_token: Some(encrypted_token),
            provider_user_id: Some(provider_user.id.to_string()),
            scopes: Some(access.scope),
            token_expires_at: None,
            encrypted_keys: serde_json::Value::Object(serde_json::Map::new()),
        })
        .await?;

    crate::audit::record(
        state.db.clone(),
        AuditEntry::new(flow.user_id, "oauth.link", "service_account")
            .resource(account.id)
            .details(json!({
                "service_slug": flow.service_slug,
                "flow": flow.flow_context,
                "project_id": flow.project_id,
            })),
    );

    Ok(Json(OAuthCallbackResponse {
        service_slug: flow.service_slug,
        provider_login: provider_user.login,
        account_id: account.id,
        redirect_to: flow.redirect_to,
    }))
}

/// GET /projects/:id/repos — list the actor's GitHub repos through the
/// project's linked account. An expired token flips the account to `expired`
/// before the error surfaces, so the client knows to reconnect.
pub async fn list_repos(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<GithubRepo>>, AppError> {
    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let (account, token) = provider_token(&state, project.id, "github").await?;

    match state.github.list_repos(&token).await {
        Ok(repos) => Ok(Json(repos)),
        Err(e @ BridgeError::AuthExpired { .. }) => {
            state
                .db
                .mark_account_status(account.id, AccountStatus::Expired, Some("token rejected"))
                .await?;
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Deserialize)]
pub struct LinkRepoRequest {
    pub repo_full_name: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

/// POST /projects/:id/repos — remember a repo for this project. Re-linking
/// the same repo updates the branch instead of duplicating the row.
pub async fn link_repo(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<LinkRepoRequest>,
) -> Result<(StatusCode, Json<LinkedRepo>), AppError> {
    state.check_write_limit(actor.user_id)?;
    require_non_empty("repo_full_name", &payload.repo_full_name, 200)?;
    if !payload.repo_full_name.contains('/') {
        return Err(AppError::Validation(
            "repo_full_name: must be 'owner/repo'".to_string(),
        ));
    }

    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let row = state
        .db
        .upsert_linked_repo(
            project.id,
            payload.repo_full_name.trim(),
            payload.default_branch.trim(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(row)))
}

#[derive(Deserialize)]
pub struct DeployRequest {
    pub repo_full_name: String,
    pub branch: Option<String>,
}

/// POST /projects/:id/deploy — trigger a Vercel deployment of a linked repo
/// and record the result.
pub async fn deploy(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<DeployRequest>,
) -> Result<(StatusCode, Json<Deployment>), AppError> {
    state.check_write_limit(actor.user_id)?;

    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let linked = state
        .db
        .list_linked_repos(project.id)
        .await?
        .into_iter()
        .find(|r| r.repo_full_name == payload.repo_full_name)
        .ok_or(AppError::NotFound)?;

    let (account, token) = provider_token(&state, project.id, "vercel").await?;
    let branch = payload.branch.unwrap_or(linked.default_branch);

    let info = match state
        .vercel
        .deploy(&token, &project.name, &linked.repo_full_name, &branch)
        .await
    {
        Ok(info) => info,
        Err(e @ BridgeError::AuthExpired { .. }) => {
            state
                .db
                .mark_account_status(account.id, AccountStatus::Expired, Some("token rejected"))
                .await?;
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let row = state
        .db
        .insert_deployment(
            project.id,
            &linked.repo_full_name,
            &info.id,
            info.url.as_deref(),
            info.ready_state.as_deref().unwrap_or("queued"),
        )
        .await?;

    crate::audit::record(
        state.db.clone(),
        AuditEntry::new(actor.user_id, "deployment.trigger", "deployment")
            .resource(row.id)
            .details(json!({
                "project_id": project.id,
                "repo_full_name": row.repo_full_name,
                "external_id": row.external_id,
            })),
    );

    Ok((StatusCode::CREATED, Json(row)))
}

/// Resolve and decrypt the project's credential for a provider. OAuth
/// accounts carry the token blob directly; api-key accounts store their keys
/// as a map, and the first one is the bearer token. A missing binding reads
/// the same as a missing project.
async fn provider_token(
    state: &Arc<AppState>,
    project_id: Uuid,
    service_slug: &str,
) -> Result<(crate::models::account::ServiceAccount, String), AppError> {
    let account = state
        .db
        .get_account_for_service(project_id, service_slug)
        .await?
        .ok_or(AppError::NotFound)?;
    let blob = match &account.encrypted_token {
        Some(blob) => blob.clone(),
        None => account
            .encrypted_keys
            .as_object()
            .and_then(|keys| keys.values().next())
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or(AppError::NotFound)?,
    };
    let token = state.vault.decrypt(&blob)?;
    Ok((account, token))
}
