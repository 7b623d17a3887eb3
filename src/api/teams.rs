use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{require_non_empty, Actor};
use crate::errors::AppError;
use crate::models::team::{Team, TeamMember, TeamRole};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
}

/// POST /teams — create a team; the creator joins as admin in the same
/// transaction.
pub async fn create(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<Team>), AppError> {
    state.check_write_limit(actor.user_id)?;
    require_non_empty("name", &payload.name, 100)?;

    let team = state.db.insert_team(actor.user_id, payload.name.trim()).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

#[derive(Serialize)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: Team,
    pub members: Vec<TeamMember>,
}

/// GET /teams/:id — members only. Non-members get the not-found shape, not a
/// membership oracle.
pub async fn get(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(team_id): Path<Uuid>,
) -> Result<Json<TeamDetail>, AppError> {
    let team = state.db.get_team(team_id).await?.ok_or(AppError::NotFound)?;
    if state.db.team_role(team.id, actor.user_id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    let members = state.db.list_team_members(team.id).await?;
    Ok(Json(TeamDetail { team, members }))
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub email: String,
    pub role: TeamRole,
}

/// POST /teams/:id/members — admins only. This is the one place a 403 exists:
/// the caller can see the team but lacks the role.
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(team_id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<TeamMember>), AppError> {
    state.check_write_limit(actor.user_id)?;

    let team = state.db.get_team(team_id).await?.ok_or(AppError::NotFound)?;
    let role = state
        .db
        .team_role(team.id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if !role.can_manage_members() {
        return Err(AppError::Forbidden);
    }

    let user = state
        .db
        .user_by_email(payload.email.trim())
        .await?
        .ok_or(AppError::NotFound)?;

    let member = state
        .db
        .insert_team_member(team.id, user.id, payload.role)
        .await
        .map_err(|e| AppError::conflict_on_unique(e, "user is already a member"))?;

    Ok((StatusCode::CREATED, Json(member)))
}
