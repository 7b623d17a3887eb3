use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::Actor;
use crate::errors::AppError;
use crate::models::audit::AuditEntry;
use crate::models::package::{Package, PackageVersion, Visibility};
use crate::package::export::export_project;
use crate::package::install::{materialize_snippets, SnippetReport};
use crate::package::{validate, PackageDescriptor, PACKAGE_NAME_RE, SEMVER_RE};
use crate::AppState;

#[derive(Deserialize)]
pub struct ExportRequest {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// POST /projects/:id/export — build a descriptor from the project's current
/// configuration. Nothing is persisted; publishing is a separate step.
pub async fn export(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<ExportRequest>,
) -> Result<Json<PackageDescriptor>, AppError> {
    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let name = match payload.name {
        Some(name) => {
            if !PACKAGE_NAME_RE.is_match(&name) {
                return Err(AppError::Validation(format!(
                    "name: '{name}' must be 2-50 lowercase alphanumeric/hyphen characters"
                )));
            }
            name
        }
        None => slugify(&project.name),
    };
    let version = payload.version.unwrap_or_else(|| "0.1.0".to_string());
    if !SEMVER_RE.is_match(&version) {
        return Err(AppError::Validation(format!(
            "version: '{version}' must be MAJOR.MINOR.PATCH"
        )));
    }

    let project_services = state.db.list_project_services(project.id).await?;
    let env_vars = state.db.list_env_vars(project.id).await?;

    let descriptor =
        export_project(&project, &name, &version, &project_services, &env_vars)
            .map_err(|e| AppError::Validation(e.to_string()))?;

    Ok(Json(descriptor))
}

#[derive(Deserialize)]
pub struct PublishRequest {
    #[serde(flatten)]
    pub descriptor: PackageDescriptor,
    pub visibility: Option<Visibility>,
}

#[derive(Serialize)]
pub struct PublishResponse {
    pub package: Package,
    pub version: PackageVersion,
}

/// POST /packages — publish a descriptor as a new package, or as a new
/// version of one the actor already owns. Versions are immutable: the same
/// version string cannot be published twice.
pub async fn publish(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishResponse>), AppError> {
    state.check_write_limit(actor.user_id)?;
    validate(&payload.descriptor).map_err(AppError::Validation)?;

    let package = match state.db.get_package_by_slug(&payload.descriptor.name).await? {
        Some(existing) if existing.owner_id == actor.user_id => existing,
        Some(_) => {
            return Err(AppError::Conflict(
                "package slug already taken by another package".to_string(),
            ))
        }
        None => {
            state
                .db
                .insert_package(
                    actor.user_id,
                    &payload.descriptor.name,
                    Some(&payload.descriptor.description),
                    payload.visibility.unwrap_or(Visibility::Private),
                )
                .await
                .map_err(|e| {
                    AppError::conflict_on_unique(
                        e,
                        "package slug already taken by another package",
                    )
                })?
        }
    };

    let config = serde_json::to_value(&payload.descriptor)
        .map_err(|e| AppError::Internal(e.into()))?;
    let version = state
        .db
        .insert_package_version(package.id, &payload.descriptor.version, config)
        .await
        .map_err(|e| {
            AppError::conflict_on_unique(e, "this version is already published")
        })?;

    crate::audit::record(
        state.db.clone(),
        AuditEntry::new(actor.user_id, "package.publish", "package")
            .resource(package.id)
            .details(json!({
                "slug": package.slug,
                "version": version.version,
            })),
    );

    Ok((
        StatusCode::CREATED,
        Json(PublishResponse { package, version }),
    ))
}

/// GET /packages — the actor's packages plus public ones.
pub async fn list(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Package>>, AppError> {
    Ok(Json(state.db.list_visible_packages(actor.user_id).await?))
}

#[derive(Serialize)]
pub struct PackageDetail {
    #[serde(flatten)]
    pub package: Package,
    pub versions: Vec<PackageVersion>,
}

/// GET /packages/:slug
pub async fn get(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(slug): Path<String>,
) -> Result<Json<PackageDetail>, AppError> {
    let package = visible_package(&state, &actor, &slug).await?;
    let versions = state.db.list_package_versions(package.id).await?;
    Ok(Json(PackageDetail { package, versions }))
}

#[derive(Deserialize)]
pub struct InstallRequest {
    pub package: String,
    pub version: String,
    /// If set, declared code snippets are materialized under this directory;
    /// existing paths are classified as conflicts and handed back untouched.
    pub target_dir: Option<String>,
}

#[derive(Serialize)]
pub struct InstallResponse {
    pub services_attached: Vec<String>,
    pub services_already_present: Vec<String>,
    /// Slugs the local catalog does not know; nothing is created for them.
    pub services_unknown: Vec<String>,
    pub env_placeholders_created: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippets: Option<SnippetReport>,
}

/// POST /projects/:id/install — re-materialize a package version into a
/// project: service rows and env-var placeholders (never values).
pub async fn install(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<InstallRequest>,
) -> Result<Json<InstallResponse>, AppError> {
    state.check_write_limit(actor.user_id)?;

    let project = state
        .db
        .get_project(project_id, actor.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let package = visible_package(&state, &actor, &payload.package).await?;
    let version = state
        .db
        .get_package_version(package.id, &payload.version)
        .await?
        .ok_or(AppError::NotFound)?;

    let descriptor: PackageDescriptor = serde_json::from_value(version.config.clone())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt package config: {e}")))?;

    let mut response = InstallResponse {
        services_attached: vec![],
        services_already_present: vec![],
        services_unknown: vec![],
        env_placeholders_created: 0,
        snippets: None,
    };

    for service in &descriptor.services {
        if state.db.get_service(&service.slug).await?.is_none() {
            response.services_unknown.push(service.slug.clone());
            continue;
        }

        let ps = match state
            .db
            .attach_service(project.id, &service.slug, service.notes.as_deref())
            .await
        {
            Ok(row) => {
                response.services_attached.push(service.slug.clone());
                row
            }
            Err(e) if crate::errors::is_unique_violation(&e) => {
                response.services_already_present.push(service.slug.clone());
                state
                    .db
                    .list_project_services(project.id)
                    .await?
                    .into_iter()
                    .find(|row| row.service_slug == service.slug)
                    .ok_or(sqlx::Error::RowNotFound)?
            }
            Err(e) => return Err(e.into()),
        };

        for var in &service.env_vars {
            let placeholder = state.vault.encrypt("")?;
            for environment in &var.environment {
                let created = state
                    .db
                    .insert_env_var_if_absent(
                        project.id,
                        Some(ps.id),
                        &var.key,
                        *environment,
                        &placeholder,
                        !var.public,
                        var.description.as_deref(),
                    )
                    .await?;
                if created {
                    response.env_placeholders_created += 1;
                }
            }
        }
    }

    if let Some(dir) = &payload.target_dir {
        let report = materialize_snippets(&PathBuf::from(dir), &descriptor.code_snippets)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("snippet write failed: {e}")))?;
        response.snippets = Some(report);
    }

    crate::audit::record(
        state.db.clone(),
        AuditEntry::new(actor.user_id, "package.install", "package")
            .resource(package.id)
            .details(json!({
                "project_id": project.id,
                "slug": package.slug,
                "version": version.version,
            })),
    );

    Ok(Json(response))
}

/// Private packages resolve only for their owner; everyone else sees the
/// same `NotFound` a nonexistent slug produces.
async fn visible_package(
    state: &Arc<AppState>,
    actor: &Actor,
    slug: &str,
) -> Result<Package, AppError> {
    let package = state
        .db
        .get_package_by_slug(slug)
        .await?
        .ok_or(AppError::NotFound)?;
    if package.visibility == Visibility::Private && package.owner_id != actor.user_id {
        return Err(AppError::NotFound);
    }
    Ok(package)
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    let mut slug: String = slug.chars().take(50).collect();
    if slug.len() < 2 {
        slug = format!("{slug}-project");
        slug = slug.trim_matches('-').to_string();
    }
    slug
}
