use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A shareable bundle of service + env-var declarations. One author, zero or
/// more immutable versions.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Package {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub slug: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

/// Published version. `config` holds the validated package descriptor;
/// republishing the same version string for a package is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PackageVersion {
    pub id: Uuid,
    pub package_id: Uuid,
    pub version: String,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
