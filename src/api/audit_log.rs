use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::Actor;
use crate::errors::AppError;
use crate::models::audit::AuditLogRow;
use crate::AppState;

#[derive(Deserialize)]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

/// GET /audit — the actor's own trail, newest first.
pub async fn list(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogRow>>, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    Ok(Json(state.db.list_audit(actor.user_id, limit).await?))
}
