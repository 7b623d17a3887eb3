use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{require_non_empty, Actor};
use crate::errors::AppError;
use crate::models::service::{
    Connection, ConnectionKind, ProjectService, Service, ServiceStatus,
};
use crate::AppState;

/// GET /services — the global catalog.
pub async fn catalog(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
) -> Result<Json<Vec<Service>>, AppError> {
    Ok(Json(state.db.list_services().await?))
}

/// GET /projects/:id/services
pub async fn list(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<ProjectService>>, AppError> {
    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(state.db.list_project_services(project.id).await?))
}

#[derive(Deserialize)]
pub struct AttachServiceRequest {
    pub service_slug: String,
    pub notes: Option<String>,
}

/// POST /projects/:id/services — attach a catalog service to the project.
pub async fn attach(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<AttachServiceRequest>,
) -> Result<(StatusCode, Json<ProjectService>), AppError> {
    state.check_write_limit(actor.user_id)?;
    require_non_empty("service_slug", &payload.service_slug, 100)?;

    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    // The slug must exist in the catalog; an unknown slug is a caller error,
    // not a conflict.
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

    let row = state
        .db
        .attach_service(project.id, payload.service_slug.trim(), payload.notes.as_deref())
        .await
        .map_err(|e| {
            AppError::conflict_on_unique(e, "service already attached to this project")
        })?;

    Ok((StatusCode::CREATED, Json(row)))
}

#[derive(Deserialize)]
pub struct UpdateServiceRequest {
    pub status: Option<ServiceStatus>,
    pub notes: Option<String>,
}

/// PATCH /projects/:id/services/:ps_id
pub async fn update(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((project_id, ps_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateServiceRequest>,
) -> Result<Json<ProjectService>, AppError> {
    state.check_write_limit(actor.user_id)?;
    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    state
        .db
        .update_project_service(ps_id, project.id, payload.status, payload.notes.as_deref())
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

/// DELETE /projects/:id/services/:ps_id
pub async fn detach(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((project_id, ps_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.check_write_limit(actor.user_id)?;
    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !state.db.detach_service(ps_id, project.id).await? {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

// ── Connections ──────────────────────────────────────────────

/// GET /projects/:id/connections
pub async fn list_connections(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Connection>>, AppError> {
    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(state.db.list_connections(project.id).await?))
}

#[derive(Deserialize)]
pub struct CreateConnectionRequest {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub kind: ConnectionKind,
    pub label: Option<String>,
}

/// POST /projects/:id/connections — user-drawn edge between two of the
/// project's services. Self-loops are rejected before any write.
pub async fn create_connection(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<CreateConnectionRequest>,
) -> Result<(StatusCode, Json<Connection>), AppError> {
    state.check_write_limit(actor.user_id)?;

    if payload.source_id == payload.target_id {
        return Err(AppError::Validation(
            "target_id: a service cannot connect to itself".to_string(),
        ));
    }

    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    // Both endpoints must be services of this project.
    for (field, id) in [("source_id", payload.source_id), ("target_id", payload.target_id)] {
        if state.db.get_project_service(id, project.id).await?.is_none() {
            return Err(AppError::Validation(format!(
                "{field}: not a service of this project"
            )));
        }
    }

    let row = state
        .db
        .insert_connection(
            project.id,
            payload.source_id,
            payload.target_id,
            payload.kind,
            payload.label.as_deref(),
        )
        .await
        .map_err(|e| AppError::conflict_on_unique(e, "connection already exists"))?;

    Ok((StatusCode::CREATED, Json(row)))
}

/// DELETE /projects/:id/connections/:conn_id
pub async fn delete_connection(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((project_id, conn_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.check_write_limit(actor.user_id)?;
    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !state.db.delete_connection(conn_id, project.id).await? {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
