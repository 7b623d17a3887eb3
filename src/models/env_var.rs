use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub static KEY_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("static regex"));

/// Per-project environment variable. The value column is always a vault
/// blob; `is_secret` controls whether the plaintext is ever returned outside
/// the audited decrypt endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnvVar {
    pub id: Uuid,
    pub project_id: Uuid,
    pub project_service_id: Option<Uuid>,
    pub key_name: String,
    pub environment: Environment,
    #[serde(skip_serializing)]
    pub encrypted_value: String,
    pub is_secret: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Staging,
    Production,
}
