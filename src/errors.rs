use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,

    /// Only returned by team role checks. Everything ownership-scoped maps
    /// "not owned" to `NotFound` instead, so existence never leaks.
    #[error("insufficient role")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("{provider} credential expired")]
    UpstreamAuthExpired { provider: String },

    #[error("upstream error from {provider}: {message}")]
    Upstream { provider: String, message: String },

    #[error("decryption failed")]
    Decryption,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Classify a write failure: uniqueness violations become `Conflict`
    /// with the given message, everything else stays a database error.
    pub fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
        if is_unique_violation(&err) {
            AppError::Conflict(message.to_string())
        } else {
            AppError::Database(err)
        }
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "unauthorized",
                "authentication required".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "insufficient_role",
                "insufficient role for this action".to_string(),
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "not_found",
                "resource not found".to_string(),
            ),
            AppError::Validation(m) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "validation_failed",
                m.clone(),
            ),
            AppError::Conflict(m) => (
                StatusCode::CONFLICT,
                "invalid_request_error",
                "conflict",
                m.clone(),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                "rate_limit_exceeded",
                "rate limit exceeded".to_string(),
            ),
            AppError::UpstreamAuthExpired { provider } => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "reconnect_required",
                format!(
                    "{provider} rejected the stored credential; reconnect the account"
                ),
            ),
            AppError::Upstream { provider, message } => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "upstream_failed",
                format!("{provider}: {message}"),
            ),
            AppError::Decryption => {
                tracing::error!("vault decryption failed (tamper or key mismatch)");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "decryption_failed",
                    "stored secret could not be decrypted".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        let mut response = (status, body).into_response();

        if matches!(self, AppError::RateLimited) {
            response
                .headers_mut()
                .insert("retry-after", axum::http::HeaderValue::from_static("60"));
        }

        response
    }
}

impl From<crate::vault::VaultError> for AppError {
    fn from(err: crate::vault::VaultError) -> Self {
        match err {
            crate::vault::VaultError::Decryption => AppError::Decryption,
            crate::vault::VaultError::Encryption(m) => {
                AppError::Internal(anyhow::anyhow!(m))
            }
        }
    }
}
