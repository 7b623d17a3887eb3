use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Global catalog entry for a third-party offering. Read-only through the
/// API; the slug is the immutable identifier packages and accounts refer to.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub slug: String,
    pub name: String,
    pub category: ServiceCategory,
    /// Guides, cost tier, and `depends_on` hints on other catalog slugs.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Service {
    /// Catalog-declared dependency slugs, from `metadata.depends_on`.
    pub fn depends_on(&self) -> Vec<String> {
        self.metadata
            .get("depends_on")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ServiceCategory {
    Auth,
    Database,
    Deploy,
    Payment,
    Email,
    Storage,
    Cache,
    Analytics,
    Monitoring,
    Vcs,
    Other,
}

/// Join row: a service a project actually uses.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectService {
    pub id: Uuid,
    pub project_id: Uuid,
    pub service_slug: String,
    pub status: ServiceStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ServiceStatus {
    NotStarted,
    InProgress,
    Connected,
    Error,
}

/// Directed edge the user draws between two of a project's services.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Connection {
    pub id: Uuid,
    pub project_id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub kind: ConnectionKind,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ConnectionKind {
    Uses,
    Integrates,
    DataTransfer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depends_on_reads_metadata() {
        let svc = Service {
            slug: "vercel".into(),
            name: "Vercel".into(),
            category: ServiceCategory::Deploy,
            metadata: serde_json::json!({"depends_on": ["github"], "cost_tier": "free"}),
            created_at: Utc::now(),
        };
        assert_eq!(svc.depends_on(), vec!["github".to_string()]);
    }

    #[test]
    fn depends_on_defaults_empty() {
        let svc = Service {
            slug: "clerk".into(),
            name: "Clerk".into(),
            category: ServiceCategory::Auth,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        };
        assert!(svc.depends_on().is_empty());
    }
}
