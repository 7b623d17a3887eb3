use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::Actor;
use crate::errors::AppError;
use crate::models::audit::AuditEntry;
use crate::models::env_var::{EnvVar, Environment, KEY_NAME_RE};
use crate::store::sqlite::NewEnvVar;
use crate::AppState;

/// List view. Non-secret values come back decrypted; secret ones only expose
/// their shape.
#[derive(Serialize)]
pub struct EnvVarView {
    #[serde(flatten)]
    pub var: EnvVar,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// GET /projects/:id/env
pub async fn list(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<EnvVarView>>, AppError> {
    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let vars = state.db.list_env_vars(project.id).await?;
    let mut views = Vec::with_capacity(vars.len());
    for var in vars {
        let value = if var.is_secret {
            None
        } else {
            Some(state.vault.decrypt(&var.encrypted_value)?)
        };
        views.push(EnvVarView { var, value });
    }
    Ok(Json(views))
}

#[derive(Deserialize)]
pub struct NewEnvVarRequest {
    pub key_name: String,
    pub environment: Environment,
    pub value: String,
    #[serde(default = "default_secret")]
    pub is_secret: bool,
    pub description: Option<String>,
    pub project_service_id: Option<Uuid>,
}

fn default_secret() -> bool {
    true
}

#[derive(Deserialize)]
pub struct BulkCreateRequest {
    pub entries: Vec<NewEnvVarRequest>,
}

/// POST /projects/:id/env/bulk — all-or-nothing batch insert. A duplicate
/// (key, environment) pair, inside the batch or against existing rows,
/// rejects the whole batch with zero rows persisted.
pub async fn bulk_create(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<BulkCreateRequest>,
) -> Result<(StatusCode, Json<Vec<EnvVar>>), AppError> {
    state.check_write_limit(actor.user_id)?;
    if payload.entries.is_empty() {
        return Err(AppError::Validation("entries: must not be empty".to_string()));
    }

    let mut seen: HashSet<(String, Environment)> = HashSet::new();
    for (i, entry) in payload.entries.iter().enumerate() {
        if !KEY_NAME_RE.is_match(&entry.key_name) {
            return Err(AppError::Validation(format!(
                "entries[{i}].key_name: '{}' must be UPPER_SNAKE_CASE",
                entry.key_name
            )));
        }
        if !seen.insert((entry.key_name.clone(), entry.environment)) {
            return Err(AppError::Validation(format!(
                "entries[{i}]: duplicate key '{}' for the same environment",
                entry.key_name
            )));
        }
    }

    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    // Linked services must belong to this project.
    for (i, entry) in payload.entries.iter().enumerate() {
        if let Some(ps_id) = entry.project_service_id {
            if state
                .db
                .get_project_service(ps_id, project.id)
                .await?
                .is_none()
            {
                return Err(AppError::Validation(format!(
                    "entries[{i}].project_service_id: not a service of this project"
                )));
            }
        }
    }

    let mut rows = Vec::with_capacity(payload.entries.len());
    for entry in payload.entries {
        rows.push(NewEnvVar {
            project_service_id: entry.project_service_id,
            key_name: entry.key_name,
            environment: entry.environment,
            encrypted_value: state.vault.encrypt(&entry.value)?,
            is_secret: entry.is_secret,
            description: entry.description,
        });
    }

    let inserted = state
        .db
        .bulk_insert_env_vars(project.id, rows)
        .await
        .map_err(|e| {
            AppError::conflict_on_unique(e, "a key already exists for that environment")
        })?;

    Ok((StatusCode::CREATED, Json(inserted)))
}

#[derive(Deserialize)]
pub struct UpdateEnvVarRequest {
    pub value: Option<String>,
    pub description: Option<String>,
    pub is_secret: Option<bool>,
}

/// PATCH /projects/:id/env/:var_id
pub async fn update(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((project_id, var_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateEnvVarRequest>,
) -> Result<Json<EnvVar>, AppError> {
    state.check_write_limit(actor.user_id)?;
    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let encrypted = match &payload.value {
        Some(value) => Some(state.vault.encrypt(value)?),
        None => None,
    };

    state
        .db
        .update_env_var(
            var_id,
            project.id,
            encrypted.as_deref(),
            payload.description.as_deref(),
            payload.is_secret,
        )
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

/// DELETE /projects/:id/env/:var_id
pub async fn remove(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((project_id, var_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.check_write_limit(actor.user_id)?;
    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !state.db.delete_env_var(var_id, project.id).await? {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct DecryptResponse {
    pub key_name: String,
    pub environment: Environment,
    pub value: String,
}

/// POST /projects/:id/env/:var_id/decrypt — the one path that materializes
/// secret plaintext. Strictly rate-limited and audited.
pub async fn decrypt(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((project_id, var_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DecryptResponse>, AppError> {
    state.check_decrypt_limit(actor.user_id)?;

    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let var = state
        .db
        .get_env_var(var_id, project.id)
        .await?
        .ok_or(AppError::NotFound)?;

    let value = state.vault.decrypt(&var.encrypted_value)?;

    crate::audit::record(
        state.db.clone(),
        AuditEntry::new(actor.user_id, "env_var.decrypt", "env_var")
            .resource(var.id)
            .details(json!({
                "project_id": project.id,
                "key_name": var.key_name,
                "environment": var.environment,
            })),
    );

    Ok(Json(DecryptResponse {
        key_name: var.key_name,
        environment: var.environment,
        value,
    }))
}
