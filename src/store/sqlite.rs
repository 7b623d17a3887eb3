//! All persistence. Ownership is re-derived from the database on every
//! scoped lookup: the target row is joined up to its owning project and the
//! owner compared in SQL, so a missing row and a row owned by someone else
//! are indistinguishable to callers (both come back `None`).
//!
//! Row-level uniqueness constraints are the only concurrency-control
//! primitive used here. Methods return `sqlx::Result` so callers can
//! classify unique violations as conflicts.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::is_unique_violation;
use crate::models::account::{AccountStatus, NewServiceAccount, ServiceAccount};
use crate::models::audit::{AuditEntry, AuditLogRow};
use crate::models::env_var::{EnvVar, Environment};
use crate::models::oauth::{Deployment, FlowContext, LinkedRepo, OAuthState};
use crate::models::package::{Package, PackageVersion, Visibility};
use crate::models::project::Project;
use crate::models::service::{
    Connection, ConnectionKind, ProjectService, Service, ServiceStatus,
};
use crate::models::team::{Team, TeamMember, TeamRole};
use crate::models::user::User;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database exists per connection; keep the pool at one
        // connection so every query sees the same database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // -- Users & sessions --

    pub async fn insert_user(
        &self,
        email: &str,
        display_name: Option<&str>,
    ) -> sqlx::Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: display_name.map(String::from),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO users (id, email, display_name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn insert_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(Utc::now())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resolve the authenticated actor from a session token hash.
    pub async fn session_user(&self, token_hash: &str) -> sqlx::Result<Option<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM sessions
             WHERE token_hash = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(token_hash)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
    }

    // -- Projects --

    pub async fn insert_project(
        &self,
        owner_id: Uuid,
        name: &str,
        description: Option<&str>,
        tech_stack: serde_json::Value,
    ) -> sqlx::Result<Project> {
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            description: description.map(String::from),
            tech_stack,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO projects (id, owner_id, name, description, tech_stack, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project.id)
        .bind(project.owner_id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.tech_stack)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(project)
    }

    pub async fn list_projects(&self, owner_id: Uuid) -> sqlx::Result<Vec<Project>> {
        sqlx::query_as::<_, Project>(
            "SELECT id, owner_id, name, description, tech_stack, created_at, updated_at
             FROM projects WHERE owner_id = ? ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Ownership check and lookup in one step: `None` for missing or not
    /// owned alike.
    pub async fn get_project(
        &self,
        id: Uuid,
        owner_id: Uuid,
    ) -> sqlx::Result<Option<Project>> {
        sqlx::query_as::<_, Project>(
            "SELECT id, owner_id, name, description, tech_stack, created_at, updated_at
             FROM projects WHERE id = ? AND owner_id = ?",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn update_project(
        &self,
        id: Uuid,
        owner_id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
        tech_stack: Option<serde_json::Value>,
    ) -> sqlx::Result<Option<Project>> {
        let result = sqlx::query(
            "UPDATE projects SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                tech_stack = COALESCE(?, tech_stack),
                updated_at = ?
             WHERE id = ? AND owner_id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(tech_stack)
        .bind(Utc::now())
        .bind(id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_project(id, owner_id).await
    }

    /// Cascades to all owned children via foreign keys.
    pub async fn delete_project(&self, id: Uuid, owner_id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Service catalog (read-only through the API) --

    pub async fn list_services(&self) -> sqlx::Result<Vec<Service>> {
        sqlx::query_as::<_, Service>(
            "SELECT slug, name, category, metadata, created_at FROM services ORDER BY slug",
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_service(&self, slug: &str) -> sqlx::Result<Option<Service>> {
        sqlx::query_as::<_, Service>(
            "SELECT slug, name, category, metadata, created_at FROM services WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
    }

    // -- Project services --

    pub async fn attach_service(
        &self,
        project_id: Uuid,
        service_slug: &str,
        notes: Option<&str>,
    ) -> sqlx::Result<ProjectService> {
        let now = Utc::now();
        let row = ProjectService {
            id: Uuid::new_v4(),
            project_id,
            service_slug: service_slug.to_string(),
            status: ServiceStatus::NotStarted,
            notes: notes.map(String::from),
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO project_services (id, project_id, service_slug, status, notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.id)
        .bind(row.project_id)
        .bind(&row.service_slug)
        .bind(row.status)
        .bind(&row.notes)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_project_services(
        &self,
        project_id: Uuid,
    ) -> sqlx::Result<Vec<ProjectService>> {
        sqlx::query_as::<_, ProjectService>(
            "SELECT id, project_id, service_slug, status, notes, created_at, updated_at
             FROM project_services WHERE project_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_project_service(
        &self,
        id: Uuid,
        project_id: Uuid,
    ) -> sqlx::Result<Option<ProjectService>> {
        sqlx::query_as::<_, ProjectService>(
            "SELECT id, project_id, service_slug, status, notes, created_at, updated_at
             FROM project_services WHERE id = ? AND project_id = ?",
        )
        .bind(id)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn update_project_service(
        &self,
        id: Uuid,
        project_id: Uuid,
        status: Option<ServiceStatus>,
        notes: Option<&str>,
    ) -> sqlx::Result<Option<ProjectService>> {
        let result = sqlx::query(
            "UPDATE project_services SET
                status = COALESCE(?, status),
                notes = COALESCE(?, notes),
                updated_at = ?
             WHERE id = ? AND project_id = ?",
        )
        .bind(status)
        .bind(notes)
        .bind(Utc::now())
        .bind(id)
        .bind(project_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_project_service(id, project_id).await
    }

    pub async fn detach_service(&self, id: Uuid, project_id: Uuid) -> sqlx::Result<bool> {
        let result =
            sqlx::query("DELETE FROM project_services WHERE id = ? AND project_id = ?")
                .bind(id)
                .bind(project_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Connections --

    pub async fn insert_connection(
        &self,
        project_id: Uuid,
        source_id: Uuid,
        target_id: Uuid,
        kind: ConnectionKind,
        label: Option<&str>,
    ) -> sqlx::Result<Connection> {
        let row = Connection {
            id: Uuid::new_v4(),
            project_id,
            source_id,
            target_id,
            kind,
            label: label.map(String::from),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO connections (id, project_id, source_id, target_id, kind, label, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.id)
        .bind(row.project_id)
        .bind(row.source_id)
        .bind(row.target_id)
        .bind(row.kind)
        .bind(&row.label)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_connections(&self, project_id: Uuid) -> sqlx::Result<Vec<Connection>> {
        sqlx::query_as::<_, Connection>(
            "SELECT id, project_id, source_id, target_id, kind, label, created_at
             FROM connections WHERE project_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn delete_connection(&self, id: Uuid, project_id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM connections WHERE id = ? AND project_id = ?")
            .bind(id)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Service accounts --

    /// Connect (or reconnect) a service account. The insert races against
    /// concurrent connects on the same natural key; on a unique violation we
    /// re-read the surviving row and update it in place, converging on a
    /// single binding instead of failing.
    pub async fn upsert_service_account(
        &self,
        new: NewServiceAccount,
    ) -> sqlx::Result<ServiceAccount> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let insert = sqlx::query(
            "INSERT INTO service_accounts
                (id, user_id, project_id, service_slug, kind, label, encrypted_token,
                 provider_user_id, scopes, token_expires_at, encrypted_keys, status,
                 last_verified_at, error_message, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
        )
        .bind(id)
        .bind(new.user_id)
        .bind(new.project_id)
        .bind(&new.service_slug)
        .bind(new.kind)
        .bind(&new.label)
        .bind(&new.encrypted_token)
        .bind(&new.provider_user_id)
        .bind(&new.scopes)
        .bind(new.token_expires_at)
        .bind(&new.encrypted_keys)
        .bind(AccountStatus::Active)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match insert {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                // A concurrent connect (or an earlier one) won; replace its
                // credential material.
                let existing_id = match new.project_id {
                    Some(pid) => {
                        sqlx::query_scalar::<_, Uuid>(
                            "SELECT id FROM service_accounts
                             WHERE project_id = ? AND service_slug = ?",
                        )
                        .bind(pid)
                        .bind(&new.service_slug)
                        .fetch_one(&self.pool)
                        .await?
                    }
                    None => {
                        sqlx::query_scalar::<_, Uuid>(
                            "SELECT id FROM service_accounts
                             WHERE user_id = ? AND project_id IS NULL AND service_slug = ?",
                        )
                        .bind(new.user_id)
                        .bind(&new.service_slug)
                        .fetch_one(&self.pool)
                        .await?
                    }
                };
                sqlx::query(
                    "UPDATE service_accounts SET
                        kind = ?, label = ?, encrypted_token = ?, provider_user_id = ?,
                        scopes = ?, token_expires_at = ?, encrypted_keys = ?,
                        status = ?, last_verified_at = ?, error_message = NULL,
                        updated_at = ?
                     WHERE id = ?",
                )
                .bind(new.kind)
                .bind(&new.label)
                .bind(&new.encrypted_token)
                .bind(&new.provider_user_id)
                .bind(&new.scopes)
                .bind(new.token_expires_at)
                .bind(&new.encrypted_keys)
                .bind(AccountStatus::Active)
                .bind(now)
                .bind(now)
                .bind(existing_id)
                .execute(&self.pool)
                .await?;
                return self
                    .get_account_by_id(existing_id)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound);
            }
            Err(e) => return Err(e),
        }

        self.get_account_by_id(id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn get_account_by_id(&self, id: Uuid) -> sqlx::Result<Option<ServiceAccount>> {
        sqlx::query_as::<_, ServiceAccount>(
            "SELECT id, user_id, project_id, service_slug, kind, label, encrypted_token,
                    provider_user_id, scopes, token_expires_at, encrypted_keys, status,
                    last_verified_at, error_message, created_at, updated_at
             FROM service_accounts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_project_accounts(
        &self,
        project_id: Uuid,
    ) -> sqlx::Result<Vec<ServiceAccount>> {
        sqlx::query_as::<_, ServiceAccount>(
            "SELECT id, user_id, project_id, service_slug, kind, label, encrypted_token,
                    provider_user_id, scopes, token_expires_at, encrypted_keys, status,
                    last_verified_at, error_message, created_at, updated_at
             FROM service_accounts WHERE project_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_account_for_service(
        &self,
        project_id: Uuid,
        service_slug: &str,
    ) -> sqlx::Result<Option<ServiceAccount>> {
        sqlx::query_as::<_, ServiceAccount>(
            "SELECT id, user_id, project_id, service_slug, kind, label, encrypted_token,
                    provider_user_id, scopes, token_expires_at, encrypted_keys, status,
                    last_verified_at, error_message, created_at, updated_at
             FROM service_accounts WHERE project_id = ? AND service_slug = ?",
        )
        .bind(project_id)
        .bind(service_slug)
        .fetch_optional(&self.pool)
        .await
    }

    /// Scoped to the project named in the URL, so an account id from one of
    /// the user's other projects does not match.
    pub async fn delete_account(&self, id: Uuid, project_id: Uuid) -> sqlx::Result<bool> {
        let result =
            sqlx::query("DELETE FROM service_accounts WHERE id = ? AND project_id = ?")
                .bind(id)
                .bind(project_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_account_status(
        &self,
        id: Uuid,
        status: AccountStatus,
        error_message: Option<&str>,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE service_accounts SET status = ?, error_message = ?, last_verified_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(status)
        .bind(error_message)
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -- Environment variables --

    pub async fn list_env_vars(&self, project_id: Uuid) -> sqlx::Result<Vec<EnvVar>> {
        sqlx::query_as::<_, EnvVar>(
            "SELECT id, project_id, project_service_id, key_name, environment,
                    encrypted_value, is_secret, description, created_at, updated_at
             FROM env_vars WHERE project_id = ?
             ORDER BY key_name ASC, environment ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_env_var(
        &self,
        id: Uuid,
        project_id: Uuid,
    ) -> sqlx::Result<Option<EnvVar>> {
        sqlx::query_as::<_, EnvVar>(
            "SELECT id, project_id, project_service_id, key_name, environment,
                    encrypted_value, is_secret, description, created_at, updated_at
             FROM env_vars WHERE id = ? AND project_id = ?",
        )
        .bind(id)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Inserts the whole batch in one transaction. Any failure (including a
    /// duplicate (key, environment) pair against existing rows) rolls the
    /// entire batch back; zero rows are persisted.
    pub async fn bulk_insert_env_vars(
        &self,
        project_id: Uuid,
        entries: Vec<NewEnvVar>,
    ) -> sqlx::Result<Vec<EnvVar>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let mut rows = Vec::with_capacity(entries.len());

        for entry in entries {
            let row = EnvVar {
                id: Uuid::new_v4(),
                project_id,
                project_service_id: entry.project_service_id,
                key_name: entry.key_name,
                environment: entry.environment,
                encrypted_value: entry.encrypted_value,
                is_secret: entry.is_secret,
                description: entry.description,
                created_at: now,
                updated_at: now,
            };
            sqlx::query(
                "INSERT INTO env_vars
                    (id, project_id, project_service_id, key_name, environment,
                     encrypted_value, is_secret, description, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(row.id)
            .bind(row.project_id)
            .bind(row.project_service_id)
            .bind(&row.key_name)
            .bind(row.environment)
            .bind(&row.encrypted_value)
            .bind(row.is_secret)
            .bind(&row.description)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&mut *tx)
            .await?;
            rows.push(row);
        }

        tx.commit().await?;
        Ok(rows)
    }

    /// Placeholder insert for package install: never clobbers an existing
    /// (key, environment) row. Returns whether a row was created.
    pub async fn insert_env_var_if_absent(
        &self,
        project_id: Uuid,
        project_service_id: Option<Uuid>,
        key_name: &str,
        environment: Environment,
        encrypted_value: &str,
        is_secret: bool,
        description: Option<&str>,
    ) -> sqlx::Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO env_vars
                (id, project_id, project_service_id, key_name, environment,
                 encrypted_value, is_secret, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (project_id, key_name, environment) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(project_service_id)
        .bind(key_name)
        .bind(environment)
        .bind(encrypted_value)
        .bind(is_secret)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_env_var(
        &self,
        id: Uuid,
        project_id: Uuid,
        encrypted_value: Option<&str>,
        description: Option<&str>,
        is_secret: Option<bool>,
    ) -> sqlx::Result<Option<EnvVar>> {
        let result = sqlx::query(
            "UPDATE env_vars SET
                encrypted_value = COALESCE(?, encrypted_value),
                description = COALESCE(?, description),
                is_secret = COALESCE(?, is_secret),
                updated_at = ?
             WHERE id = ? AND project_id = ?",
        )
        .bind(encrypted_value)
        .bind(description)
        .bind(is_secret)
        .bind(Utc::now())
        .bind(id)
        .bind(project_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_env_var(id, project_id).await
    }

    pub async fn delete_env_var(&self, id: Uuid, project_id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM env_vars WHERE id = ? AND project_id = ?")
            .bind(id)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Packages --

    pub async fn insert_package(
        &self,
        owner_id: Uuid,
        slug: &str,
        description: Option<&str>,
        visibility: Visibility,
    ) -> sqlx::Result<Package> {
        let package = Package {
            id: Uuid::new_v4(),
            owner_id,
            slug: slug.to_string(),
            description: description.map(String::from),
            visibility,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO packages (id, owner_id, slug, description, visibility, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(package.id)
        .bind(package.owner_id)
        .bind(&package.slug)
        .bind(&package.description)
        .bind(package.visibility)
        .bind(package.created_at)
        .execute(&self.pool)
        .await?;
        Ok(package)
    }

    pub async fn get_package_by_slug(&self, slug: &str) -> sqlx::Result<Option<Package>> {
        sqlx::query_as::<_, Package>(
            "SELECT id, owner_id, slug, description, visibility, created_at
             FROM packages WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
    }

    /// Packages visible to a user: their own plus public ones.
    pub async fn list_visible_packages(&self, user_id: Uuid) -> sqlx::Result<Vec<Package>> {
        sqlx::query_as::<_, Package>(
            "SELECT id, owner_id, slug, description, visibility, created_at
             FROM packages WHERE owner_id = ? OR visibility = 'public'
             ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Versions are immutable: the (package, version) uniqueness constraint
    /// rejects republishing an existing version string.
    pub async fn insert_package_version(
        &self,
        package_id: Uuid,
        version: &str,
        config: serde_json::Value,
    ) -> sqlx::Result<PackageVersion> {
        let row = PackageVersion {
            id: Uuid::new_v4(),
            package_id,
            version: version.to_string(),
            config,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO package_versions (id, package_id, version, config, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(row.id)
        .bind(row.package_id)
        .bind(&row.version)
        .bind(&row.config)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_package_versions(
        &self,
        package_id: Uuid,
    ) -> sqlx::Result<Vec<PackageVersion>> {
        sqlx::query_as::<_, PackageVersion>(
            "SELECT id, package_id, version, config, created_at
             FROM package_versions WHERE package_id = ?
             ORDER BY created_at ASC",
        )
        .bind(package_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_package_version(
        &self,
        package_id: Uuid,
        version: &str,
    ) -> sqlx::Result<Option<PackageVersion>> {
        sqlx::query_as::<_, PackageVersion>(
            "SELECT id, package_id, version, config, created_at
             FROM package_versions WHERE package_id = ? AND version = ?",
        )
        .bind(package_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
    }

    // -- OAuth state --

    pub async fn insert_oauth_state(
        &self,
        token: &str,
        user_id: Uuid,
        project_id: Option<Uuid>,
        service_slug: &str,
        redirect_to: Option<&str>,
        flow_context: FlowContext,
        ttl_minutes: i64,
    ) -> sqlx::Result<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO oauth_states
                (token, user_id, project_id, service_slug, redirect_to, flow_context,
                 consumed, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(token)
        .bind(user_id)
        .bind(project_id)
        .bind(service_slug)
        .bind(redirect_to)
        .bind(flow_context)
        .bind(now)
        .bind(now + Duration::minutes(ttl_minutes))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Single-use consumption: the guarded UPDATE only matches an issued,
    /// unconsumed, unexpired token, so two racing callbacks cannot both
    /// succeed. Returns `None` on any miss; callers fail closed.
    pub async fn consume_oauth_state(&self, token: &str) -> sqlx::Result<Option<OAuthState>> {
        sqlx::query_as::<_, OAuthState>(
            "UPDATE oauth_states SET consumed = 1
             WHERE token = ? AND consumed = 0 AND expires_at > ?
             RETURNING token, user_id, project_id, service_slug, redirect_to,
                       flow_context, consumed, created_at, expires_at",
        )
        .bind(token)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
    }

    // -- Linked repos & deployments --

    /// Relinking the same repo replaces the prior binding.
    pub async fn upsert_linked_repo(
        &self,
        project_id: Uuid,
        repo_full_name: &str,
        default_branch: &str,
    ) -> sqlx::Result<LinkedRepo> {
        sqlx::query(
            "INSERT INTO linked_repos (id, project_id, repo_full_name, default_branch, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (project_id, repo_full_name)
             DO UPDATE SET default_branch = excluded.default_branch",
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(repo_full_name)
        .bind(default_branch)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, LinkedRepo>(
            "SELECT id, project_id, repo_full_name, default_branch, created_at
             FROM linked_repos WHERE project_id = ? AND repo_full_name = ?",
        )
        .bind(project_id)
        .bind(repo_full_name)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_linked_repos(&self, project_id: Uuid) -> sqlx::Result<Vec<LinkedRepo>> {
        sqlx::query_as::<_, LinkedRepo>(
            "SELECT id, project_id, repo_full_name, default_branch, created_at
             FROM linked_repos WHERE project_id = ? ORDER BY created_at ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn insert_deployment(
        &self,
        project_id: Uuid,
        repo_full_name: &str,
        external_id: &str,
        url: Option<&str>,
        status: &str,
    ) -> sqlx::Result<Deployment> {
        let row = Deployment {
            id: Uuid::new_v4(),
            project_id,
            repo_full_name: repo_full_name.to_string(),
            external_id: external_id.to_string(),
            url: url.map(String::from),
            status: status.to_string(),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO deployments (id, project_id, repo_full_name, external_id, url, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.id)
        .bind(row.project_id)
        .bind(&row.repo_full_name)
        .bind(&row.external_id)
        .bind(&row.url)
        .bind(&row.status)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(row)
    }

    // -- Teams --

    /// Creates the team and enrolls the owner as admin in one transaction.
    pub async fn insert_team(&self, owner_id: Uuid, name: &str) -> sqlx::Result<Team> {
        let team = Team {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO teams (id, owner_id, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(team.id)
            .bind(team.owner_id)
            .bind(&team.name)
            .bind(team.created_at)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO team_members (id, team_id, user_id, role, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(team.id)
        .bind(owner_id)
        .bind(TeamRole::Admin)
        .bind(team.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(team)
    }

    pub async fn get_team(&self, id: Uuid) -> sqlx::Result<Option<Team>> {
        sqlx::query_as::<_, Team>(
            "SELECT id, owner_id, name, created_at FROM teams WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn team_role(&self, team_id: Uuid, user_id: Uuid) -> sqlx::Result<Option<TeamRole>> {
        sqlx::query_scalar::<_, TeamRole>(
            "SELECT role FROM team_members WHERE team_id = ? AND user_id = ?",
        )
        .bind(team_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn insert_team_member(
        &self,
        team_id: Uuid,
        user_id: Uuid,
        role: TeamRole,
    ) -> sqlx::Result<TeamMember> {
        let row = TeamMember {
            id: Uuid::new_v4(),
            team_id,
            user_id,
            role,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO team_members (id, team_id, user_id, role, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(row.id)
        .bind(row.team_id)
        .bind(row.user_id)
        .bind(row.role)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_team_members(&self, team_id: Uuid) -> sqlx::Result<Vec<TeamMember>> {
        sqlx::query_as::<_, TeamMember>(
            "SELECT id, team_id, user_id, role, created_at
             FROM team_members WHERE team_id = ? ORDER BY created_at ASC",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn user_by_email(&self, email: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, display_name, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    // -- Audit log --

    pub async fn insert_audit(&self, entry: &AuditEntry) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, user_id, action, resource_type, resource_id, details, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.details)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_audit(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> sqlx::Result<Vec<AuditLogRow>> {
        sqlx::query_as::<_, AuditLogRow>(
            "SELECT id, user_id, action, resource_type, resource_id, details, created_at
             FROM audit_log WHERE user_id = ?
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

/// Pre-encrypted env-var entry for bulk insert.
#[derive(Debug, Clone)]
pub struct NewEnvVar {
    pub project_service_id: Option<Uuid>,
    pub key_name: String,
    pub environment: Environment,
    pub encrypted_value: String,
    pub is_secret: bool,
    pub description: Option<String>,
}
