use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{require_non_empty, Actor};
use crate::errors::AppError;
use crate::models::account::{AccountKind, NewServiceAccount, ServiceAccount};
use crate::models::audit::AuditEntry;
use crate::AppState;

/// GET /projects/:id/accounts — secret material never leaves the row
/// (encrypted fields are skipped on serialize).
pub async fn list(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<ServiceAccount>>, AppError> {
    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(state.db.list_project_accounts(project.id).await?))
}

#[derive(Deserialize)]
pub struct ConnectApiKeyRequest {
    pub service_slug: String,
    pub label: Option<String>,
    /// Key name → plaintext value; encrypted before storage.
    pub keys: BTreeMap<String, String>,
}

/// POST /projects/:id/accounts — connect (or reconnect) an api-key account.
/// Reconnecting overwrites the prior binding for (project, service).
pub async fn connect_api_key(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<ConnectApiKeyRequest>,
) -> Result<(StatusCode, Json<ServiceAccount>), AppError> {
    state.check_write_limit(actor.user_id)?;
    require_non_empty("service_slug", &payload.service_slug, 100)?;
    if payload.keys.is_empty() {
        return Err(AppError::Validation("keys: must not be empty".to_string()));
    }

    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    state
        .db
        .get_service(payload.service_slug.trim())
        .await?
        .ok_or_else(|| {
            AppError::Validation(format!(
                "service_slug: unknown service '{}'",
                payload.service_slug.trim()
            ))
        })?;

    let mut encrypted_keys = serde_json::Map::new();
    for (name, value) in &payload.keys {
        require_non_empty("keys", name, 100)?;
        encrypted_keys.insert(name.clone(), json!(state.vault.encrypt(value)?));
    }

    let account = state
        .db
        .upsert_service_account(NewServiceAccount {
            user_id: actor.user_id,
            project_id: Some(project.id),
            service_slug: payload.service_slug.trim().to_string(),
            kind: AccountKind::ApiKey,
            label: payload.label,
            encrypted_token: None,
            provider_user_id: None,
            scopes: None,
            token_expires_at: None,
            encrypted_keys: serde_json::Value::Object(encrypted_keys),
        })
        .await?;

    crate::audit::record(
        state.db.clone(),
        AuditEntry::new(actor.user_id, "service_account.connect", "service_account")
            .resource(account.id)
            .details(json!({
                "project_id": project.id,
                "service_slug": account.service_slug,
                "kind": "api_key",
            })),
    );

    Ok((StatusCode::CREATED, Json(account)))
}

/// DELETE /projects/:id/accounts/:account_id
pub async fn remove(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((project_id, account_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.check_write_limit(actor.user_id)?;
    // Scoped twice: the project must be the actor's, and the account row is
    // deleted through that project, never the client-supplied id alone.
    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !state.db.delete_account(account_id, project.id).await? {
        return Err(AppError::NotFound);
    }

    crate::audit::record(
        state.db.clone(),
        AuditEntry::new(actor.user_id, "service_account.delete", "service_account")
            .resource(account_id),
    );

    Ok(StatusCode::NO_CONTENT)
}
