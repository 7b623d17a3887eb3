use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{generate_session_token, hash_token, require_non_empty, Actor};
use crate::errors::AppError;
use crate::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub email: String,
    /// Returned exactly once; only its hash is stored.
    pub token: String,
}

/// POST /auth/register — create a user and mint their first session token.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    require_non_empty("email", &payload.email, 254)?;
    if !payload.email.contains('@') {
        return Err(AppError::Validation(
            "email: must be a valid address".to_string(),
        ));
    }

    let user = state
        .db
        .insert_user(payload.email.trim(), payload.display_name.as_deref())
        .await
        .map_err(|e| AppError::conflict_on_unique(e, "email already registered"))?;

    let token = generate_session_token();
    state
        .db
        .insert_session(user.id, &hash_token(&token), None)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            email: user.email,
            token,
        }),
    ))
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// POST /auth/tokens — mint an additional session token for the actor.
pub async fn mint_token(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    state.check_write_limit(actor.user_id)?;
    let token = generate_session_token();
    state
        .db
        .insert_session(actor.user_id, &hash_token(&token), None)
        .await?;
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}
