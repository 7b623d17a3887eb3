//! Export: walk a project's attached services and their env vars and emit a
//! package descriptor. Values are excluded by construction; only key names,
//! descriptions, secrecy flags, and the environments that define them leave
//! the project.

use std::collections::BTreeMap;

use crate::models::env_var::{EnvVar, Environment};
use crate::models::project::Project;
use crate::models::service::ProjectService;

use super::{PackageDescriptor, PackageEnvVar, PackageService};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// A project with zero attached services cannot be exported.
    #[error("project has no attached services to export")]
    NoServices,
}

pub fn export_project(
    project: &Project,
    name: &str,
    version: &str,
    project_services: &[ProjectService],
    env_vars: &[EnvVar],
) -> Result<PackageDescriptor, ExportError> {
    if project_services.is_empty() {
        return Err(ExportError::NoServices);
    }

    let services = project_services
        .iter()
        .map(|ps| PackageService {
            slug: ps.service_slug.clone(),
            required: true,
            env_vars: group_env_vars(ps, env_vars),
            notes: ps.notes.clone(),
        })
        .collect();

    Ok(PackageDescriptor {
        name: name.to_string(),
        version: version.to_string(),
        description: project.description.clone().unwrap_or_default(),
        tech_stack: tech_stack_map(&project.tech_stack),
        services,
        code_snippets: vec![],
    })
}

/// One declaration per distinct key, its environments merged in enum order.
fn group_env_vars(ps: &ProjectService, env_vars: &[EnvVar]) -> Vec<PackageEnvVar> {
    let mut by_key: BTreeMap<String, PackageEnvVar> = BTreeMap::new();
    for var in env_vars
        .iter()
        .filter(|v| v.project_service_id == Some(ps.id))
    {
        let entry = by_key.entry(var.key_name.clone()).or_insert(PackageEnvVar {
            key: var.key_name.clone(),
            description: var.description.clone(),
            public: !var.is_secret,
            environment: Vec::new(),
        });
        if !entry.environment.contains(&var.environment) {
            entry.environment.push(var.environment);
        }
        if entry.description.is_none() {
            entry.description = var.description.clone();
        }
        // Any secret declaration makes the exported key secret.
        entry.public = entry.public && !var.is_secret;
    }
    let mut vars: Vec<PackageEnvVar> = by_key.into_values().collect();
    for var in &mut vars {
        var.environment.sort();
    }
    vars
}

/// Only string values survive export; the mapping is otherwise opaque.
fn tech_stack_map(value: &serde_json::Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn project() -> Project {
        Project {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Demo".into(),
            description: Some("demo project".into()),
            tech_stack: serde_json::json!({"framework": "nextjs", "nested": {"x": 1}}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ps(project_id: Uuid, slug: &str) -> ProjectService {
        ProjectService {
            id: Uuid::new_v4(),
            project_id,
            service_slug: slug.into(),
            status: crate::models::service::ServiceStatus::Connected,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn var(
        project_id: Uuid,
        ps_id: Uuid,
        key: &str,
        env: Environment,
        secret: bool,
    ) -> EnvVar {
        EnvVar {
            id: Uuid::new_v4(),
            project_id,
            project_service_id: Some(ps_id),
            key_name: key.into(),
            environment: env,
            encrypted_value: "blob".into(),
            is_secret: secret,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn zero_services_is_a_precondition_failure() {
        let p = project();
        let err = export_project(&p, "demo", "1.0.0", &[], &[]).unwrap_err();
        assert!(matches!(err, ExportError::NoServices));
    }

    #[test]
    fn services_grouped_with_merged_environments() {
        let p = project();
        let stripe = ps(p.id, "stripe");
        let supabase = ps(p.id, "supabase");
        let vars = vec![
            var(p.id, stripe.id, "STRIPE_SECRET_KEY", Environment::Development, true),
            var(p.id, stripe.id, "STRIPE_SECRET_KEY", Environment::Production, true),
            var(p.id, supabase.id, "SUPABASE_URL", Environment::Development, false),
        ];

        let descriptor = export_project(
            &p,
            "demo-pack",
            "1.0.0",
            &[stripe.clone(), supabase.clone()],
            &vars,
        )
        .unwrap();

        assert_eq!(descriptor.services.len(), 2);
        let stripe_entry = &descriptor.services[0];
        assert_eq!(stripe_entry.slug, "stripe");
        assert_eq!(stripe_entry.env_vars.len(), 1);
        assert_eq!(
            stripe_entry.env_vars[0].environment,
            vec![Environment::Development, Environment::Production]
        );
        assert!(!stripe_entry.env_vars[0].public);

        let supabase_entry = &descriptor.services[1];
        assert!(supabase_entry.env_vars[0].public);
    }

    #[test]
    fn values_never_leave_the_project() {
        let p = project();
        let stripe = ps(p.id, "stripe");
        let vars = vec![var(
            p.id,
            stripe.id,
            "STRIPE_SECRET_KEY",
            Environment::Production,
            true,
        )];
        let descriptor =
            export_project(&p, "demo-pack", "1.0.0", std::slice::from_ref(&stripe), &vars)
                .unwrap();
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(!json.contains("blob"));
        assert!(!json.contains("encrypted_value"));
    }

    #[test]
    fn tech_stack_keeps_only_string_values() {
        let p = project();
        let stripe = ps(p.id, "stripe");
        let descriptor =
            export_project(&p, "demo-pack", "1.0.0", std::slice::from_ref(&stripe), &[])
                .unwrap();
        assert_eq!(descriptor.tech_stack.get("framework").unwrap(), "nextjs");
        assert!(!descriptor.tech_stack.contains_key("nested"));
    }
}
