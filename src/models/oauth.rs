use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Single-use CSRF token row for an OAuth attempt. A callback presenting a
/// token that is unknown, expired, or already consumed fails closed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OAuthState {
    pub token: String,
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub service_slug: String,
    pub redirect_to: Option<String>,
    pub flow_context: FlowContext,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Which downstream action the callback performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum FlowContext {
    /// Bind the credential to a specific project.
    Project,
    /// User-level account creation (one-click deploy path).
    Oneclick,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LinkedRepo {
    pub id: Uuid,
    pub project_id: Uuid,
    pub repo_full_name: String,
    pub default_branch: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Deployment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub repo_full_name: String,
    pub external_id: String,
    pub url: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
