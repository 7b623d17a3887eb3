use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A credential binding a project (or, for oneclick flows, a user directly)
/// to a catalog service. Secret material only ever appears here as vault
/// blobs; `encrypted_keys` maps key names to blobs for api-key accounts,
/// `encrypted_token` holds the blob for OAuth accounts.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub service_slug: String,
    pub kind: AccountKind,
    pub label: Option<String>,
    #[serde(skip_serializing)]
    pub encrypted_token: Option<String>,
    pub provider_user_id: Option<String>,
    pub scopes: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub encrypted_keys: serde_json::Value,
    pub status: AccountStatus,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AccountKind {
    Oauth,
    ApiKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Error,
    Expired,
}

/// Insert/upsert payload for a binding. Reconnecting a service replaces the
/// prior binding rather than duplicating it.
#[derive(Debug, Clone)]
pub struct NewServiceAccount {
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub service_slug: String,
    pub kind: AccountKind,
    pub label: Option<String>,
    pub encrypted_token: Option<String>,
    pub provider_user_id: Option<String>,
    pub scopes: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub encrypted_keys: serde_json::Value,
}
