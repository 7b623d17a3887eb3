use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{require_non_empty, validate_tech_stack, Actor};
use crate::errors::AppError;
use crate::graph::{build_graph, Graph};
use crate::models::audit::AuditEntry;
use crate::models::project::Project;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tech_stack: Option<serde_json::Value>,
}

/// GET /projects
pub async fn list(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Project>>, AppError> {
    Ok(Json(state.db.list_projects(actor.user_id).await?))
}

/// POST /projects
pub async fn create(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    state.check_write_limit(actor.user_id)?;
    require_non_empty("name", &payload.name, 100)?;
    let tech_stack = payload.tech_stack.unwrap_or_else(|| json!({}));
    validate_tech_stack(&tech_stack)?;

    let project = state
        .db
        .insert_project(
            actor.user_id,
            payload.name.trim(),
            payload.description.as_deref(),
            tech_stack,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /projects/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, AppError> {
    state
        .db
        .get_project(id, actor.user_id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

#[derive(Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tech_stack: Option<serde_json::Value>,
}

/// PATCH /projects/:id
pub async fn update(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, AppError> {
    state.check_write_limit(actor.user_id)?;
    if let Some(name) = &payload.name {
        require_non_empty("name", name, 100)?;
    }
    if let Some(stack) = &payload.tech_stack {
        validate_tech_stack(stack)?;
    }

    state
        .db
        .update_project(
            id,
            actor.user_id,
            payload.name.as_deref().map(str::trim),
            payload.description.as_deref(),
            payload.tech_stack,
        )
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

/// DELETE /projects/:id — cascades to every owned child row.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.check_write_limit(actor.user_id)?;
    if !state.db.delete_project(id, actor.user_id).await? {
        return Err(AppError::NotFound);
    }
    crate::audit::record(
        state.db.clone(),
        AuditEntry::new(actor.user_id, "project.delete", "project").resource(id),
    );
    Ok(StatusCode::NO_CONTENT)
}

/// GET /projects/:id/graph — the visualization read model, recomputed per
/// request.
pub async fn graph(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Graph>, AppError> {
    let project = state
        .db
        .get_project(id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let project_services = state.db.list_project_services(project.id).await?;
    let connections = state.db.list_connections(project.id).await?;
    let catalog = state.db.list_services().await?;

    Ok(Json(build_graph(
        &project.name,
        &project_services,
        &connections,
        &catalog,
    )))
}
