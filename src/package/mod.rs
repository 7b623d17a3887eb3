//! Package ("linkmap") descriptor: the portable declarative format a
//! project's service/env-var configuration exports to and installs from.
//! Values are never part of a descriptor, only key declarations.

pub mod export;
pub mod install;

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::env_var::{Environment, KEY_NAME_RE};

pub static PACKAGE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,49}$").expect("static regex"));
pub static SEMVER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)$").expect("static regex"));

pub const MAX_CODE_SNIPPETS: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default)]
    pub tech_stack: BTreeMap<String, String>,
    pub services: Vec<PackageService>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_snippets: Vec<CodeSnippet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageService {
    pub slug: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub env_vars: Vec<PackageEnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Env-var declaration: key and shape only, never a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageEnvVar {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub public: bool,
    pub environment: Vec<Environment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub path: String,
    pub content: String,
    pub strategy: SnippetStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnippetStrategy {
    Create,
    Merge,
    Append,
}

/// Validates a descriptor against the package schema, reporting the first
/// failing field.
pub fn validate(descriptor: &PackageDescriptor) -> Result<(), String> {
    if !PACKAGE_NAME_RE.is_match(&descriptor.name) {
        return Err(format!(
            "name: '{}' must be 2-50 lowercase alphanumeric/hyphen characters",
            descriptor.name
        ));
    }
    if !SEMVER_RE.is_match(&descriptor.version) {
        return Err(format!(
            "version: '{}' must be MAJOR.MINOR.PATCH",
            descriptor.version
        ));
    }
    if descriptor.services.is_empty() {
        return Err("services: must not be empty".to_string());
    }
    for (i, service) in descriptor.services.iter().enumerate() {
        if service.slug.trim().is_empty() {
            return Err(format!("services[{i}].slug: must not be empty"));
        }
        for (j, var) in service.env_vars.iter().enumerate() {
            if !KEY_NAME_RE.is_match(&var.key) {
                return Err(format!(
                    "services[{i}].env_vars[{j}].key: '{}' must be UPPER_SNAKE_CASE",
                    var.key
                ));
            }
            if var.environment.is_empty() {
                return Err(format!(
                    "services[{i}].env_vars[{j}].environment: must not be empty"
                ));
            }
        }
    }
    if descriptor.code_snippets.len() > MAX_CODE_SNIPPETS {
        return Err(format!(
            "code_snippets: at most {MAX_CODE_SNIPPETS} entries allowed"
        ));
    }
    for (i, snippet) in descriptor.code_snippets.iter().enumerate() {
        if snippet.path.trim().is_empty() {
            return Err(format!("code_snippets[{i}].path: must not be empty"));
        }
        let path = std::path::Path::new(&snippet.path);
        if path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(format!(
                "code_snippets[{i}].path: must be relative without '..'"
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> PackageDescriptor {
        PackageDescriptor {
            name: "nextjs-saas-starter".into(),
            version: "1.0.0".into(),
            description: "Auth + payments starter".into(),
            tech_stack: BTreeMap::new(),
            services: vec![PackageService {
                slug: "stripe".into(),
                required: true,
                env_vars: vec![PackageEnvVar {
                    key: "STRIPE_SECRET_KEY".into(),
                    description: None,
                    public: false,
                    environment: vec![Environment::Development, Environment::Production],
                }],
                notes: None,
            }],
            code_snippets: vec![],
        }
    }

    #[test]
    fn minimal_descriptor_is_valid() {
        assert!(validate(&minimal()).is_ok());
    }

    #[test]
    fn name_pattern_enforced() {
        for bad in ["", "A", "Has-Upper", "x", "-leading", "with space", &"a".repeat(51)] {
            let mut d = minimal();
            d.name = bad.to_string();
            let err = validate(&d).unwrap_err();
            assert!(err.starts_with("name:"), "{bad}: {err}");
        }
        let mut d = minimal();
        d.name = "ab".into();
        assert!(validate(&d).is_ok());
    }

    #[test]
    fn version_must_be_strict_semver() {
        for bad in ["1.0", "v1.0.0", "1.0.0-beta", "01.0.0", "1.0.0.0", ""] {
            let mut d = minimal();
            d.version = bad.to_string();
            assert!(validate(&d).unwrap_err().starts_with("version:"), "{bad}");
        }
        for ok in ["0.0.1", "1.0.0", "10.20.30"] {
            let mut d = minimal();
            d.version = ok.to_string();
            assert!(validate(&d).is_ok(), "{ok}");
        }
    }

    #[test]
    fn services_must_not_be_empty() {
        let mut d = minimal();
        d.services.clear();
        assert_eq!(validate(&d).unwrap_err(), "services: must not be empty");
    }

    #[test]
    fn env_key_and_environment_checked() {
        let mut d = minimal();
        d.services[0].env_vars[0].key = "lower_case".into();
        assert!(validate(&d)
            .unwrap_err()
            .contains("services[0].env_vars[0].key"));

        let mut d = minimal();
        d.services[0].env_vars[0].environment.clear();
        assert!(validate(&d)
            .unwrap_err()
            .contains("environment: must not be empty"));
    }

    #[test]
    fn snippet_limits_and_paths() {
        let snippet = CodeSnippet {
            path: "src/lib/stripe.ts".into(),
            content: "export {}".into(),
            strategy: SnippetStrategy::Create,
            description: None,
        };

        let mut d = minimal();
        d.code_snippets = vec![snippet.clone(); MAX_CODE_SNIPPETS + 1];
        assert!(validate(&d).unwrap_err().starts_with("code_snippets:"));

        let mut d = minimal();
        d.code_snippets = vec![CodeSnippet {
            path: "../escape.ts".into(),
            ..snippet.clone()
        }];
        assert!(validate(&d).unwrap_err().contains("without '..'"));

        let mut d = minimal();
        d.code_snippets = vec![CodeSnippet {
            path: "/etc/passwd".into(),
            ..snippet
        }];
        assert!(validate(&d).is_err());
    }

    #[test]
    fn first_failure_wins() {
        let mut d = minimal();
        d.name = "BAD NAME".into();
        d.version = "also-bad".into();
        assert!(validate(&d).unwrap_err().starts_with("name:"));
    }
}
