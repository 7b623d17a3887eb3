//! Service-dependency graph: a pure projection over a project's services and
//! user-drawn connections, recomputed on every read. Ordering is stable
//! (creation timestamp, then id, catalog overlay by slug) so re-renders of
//! the diagram do not jitter.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::service::{Connection, ConnectionKind, ProjectService, Service, ServiceStatus};

pub const APP_NODE_ID: &str = "app";

#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ServiceStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// The synthetic "my app" hub node.
    App,
    /// A service the project actually uses.
    Service,
    /// A catalog-suggested dependency not (yet) attached to the project.
    Suggested,
}

#[derive(Debug, Clone, Serialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// User-drawn connection, carries its own type for rendering.
    Uses,
    Integrates,
    DataTransfer,
    /// Read-only overlay from the catalog's `depends_on` hints.
    CatalogDependency,
}

impl From<ConnectionKind> for EdgeKind {
    fn from(kind: ConnectionKind) -> Self {
        match kind {
            ConnectionKind::Uses => EdgeKind::Uses,
            ConnectionKind::Integrates => EdgeKind::Integrates,
            ConnectionKind::DataTransfer => EdgeKind::DataTransfer,
        }
    }
}

/// Inputs are expected pre-sorted by creation time (the store guarantees
/// this); the overlay pass sorts by slug internally.
pub fn build_graph(
    project_name: &str,
    project_services: &[ProjectService],
    connections: &[Connection],
    catalog: &[Service],
) -> Graph {
    let mut nodes = Vec::with_capacity(project_services.len() + 1);
    nodes.push(Node {
        id: APP_NODE_ID.to_string(),
        label: project_name.to_string(),
        kind: NodeKind::App,
        service_slug: None,
        status: None,
    });

    let catalog_by_slug: HashMap<&str, &Service> =
        catalog.iter().map(|s| (s.slug.as_str(), s)).collect();
    let attached_by_slug: HashMap<&str, Uuid> = project_services
        .iter()
        .map(|ps| (ps.service_slug.as_str(), ps.id))
        .collect();

    for ps in project_services {
        let label = catalog_by_slug
            .get(ps.service_slug.as_str())
            .map(|s| s.name.clone())
            .unwrap_or_else(|| ps.service_slug.clone());
        nodes.push(Node {
            id: ps.id.to_string(),
            label,
            kind: NodeKind::Service,
            service_slug: Some(ps.service_slug.clone()),
            status: Some(ps.status),
        });
    }

    let mut edges: Vec<Edge> = connections
        .iter()
        .map(|c| Edge {
            id: c.id.to_string(),
            source: c.source_id.to_string(),
            target: c.target_id.to_string(),
            kind: c.kind.into(),
            label: c.label.clone(),
        })
        .collect();

    // Catalog overlay: for each attached service, walk its declared
    // dependencies in slug order. Dependencies already attached get an edge
    // between the real nodes; missing ones get a suggested ghost node.
    let mut suggested: Vec<(String, String)> = Vec::new();
    for ps in project_services {
        let Some(service) = catalog_by_slug.get(ps.service_slug.as_str()) else {
            continue;
        };
        let mut deps = service.depends_on();
        deps.sort();
        for dep_slug in deps {
            let target = match attached_by_slug.get(dep_slug.as_str()) {
                Some(id) => id.to_string(),
                None => {
                    let ghost_id = format!("suggested:{dep_slug}");
                    if !suggested.iter().any(|(id, _)| id == &ghost_id) {
                        let label = catalog_by_slug
                            .get(dep_slug.as_str())
                            .map(|s| s.name.clone())
                            .unwrap_or_else(|| dep_slug.clone());
                        suggested.push((ghost_id.clone(), label));
                    }
                    ghost_id
                }
            };
            edges.push(Edge {
                id: format!("dep:{}:{}", ps.service_slug, dep_slug),
                source: ps.id.to_string(),
                target,
                kind: EdgeKind::CatalogDependency,
                label: None,
            });
        }
    }

    suggested.sort();
    for (id, label) in suggested {
        let slug = id.strip_prefix("suggested:").map(String::from);
        nodes.push(Node {
            id,
            label,
            kind: NodeKind::Suggested,
            service_slug: slug,
            status: None,
        });
    }

    Graph { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn svc(slug: &str, depends_on: Vec<&str>) -> Service {
        Service {
            slug: slug.into(),
            name: slug.to_uppercase(),
            category: crate::models::service::ServiceCategory::Other,
            metadata: json!({ "depends_on": depends_on }),
            created_at: Utc::now(),
        }
    }

    fn attached(project_id: Uuid, slug: &str) -> ProjectService {
        ProjectService {
            id: Uuid::new_v4(),
            project_id,
            service_slug: slug.into(),
            status: ServiceStatus::InProgress,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn app_node_comes_first() {
        let graph = build_graph("demo", &[], &[], &[]);
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].id, APP_NODE_ID);
        assert_eq!(graph.nodes[0].kind, NodeKind::App);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn user_connections_carry_kind() {
        let project = Uuid::new_v4();
        let a = attached(project, "stripe");
        let b = attached(project, "supabase");
        let conn = Connection {
            id: Uuid::new_v4(),
            project_id: project,
            source_id: a.id,
            target_id: b.id,
            kind: ConnectionKind::DataTransfer,
            label: Some("webhooks".into()),
            created_at: Utc::now(),
        };
        let graph = build_graph(
            "demo",
            &[a.clone(), b.clone()],
            std::slice::from_ref(&conn),
            &[svc("stripe", vec![]), svc("supabase", vec![])],
        );
        assert_eq!(graph.nodes.len(), 3);
        let edge = &graph.edges[0];
        assert_eq!(edge.kind, EdgeKind::DataTransfer);
        assert_eq!(edge.source, a.id.to_string());
        assert_eq!(edge.target, b.id.to_string());
        assert_eq!(edge.label.as_deref(), Some("webhooks"));
    }

    #[test]
    fn catalog_dependency_links_attached_services() {
        let project = Uuid::new_v4();
        let vercel = attached(project, "vercel");
        let github = attached(project, "github");
        let graph = build_graph(
            "demo",
            &[vercel.clone(), github.clone()],
            &[],
            &[svc("vercel", vec!["github"]), svc("github", vec![])],
        );
        let dep = graph
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::CatalogDependency)
            .unwrap();
        assert_eq!(dep.source, vercel.id.to_string());
        assert_eq!(dep.target, github.id.to_string());
    }

    #[test]
    fn missing_dependency_becomes_suggested_node() {
        let project = Uuid::new_v4();
        let vercel = attached(project, "vercel");
        let graph = build_graph(
            "demo",
            std::slice::from_ref(&vercel),
            &[],
            &[svc("vercel", vec!["github"]), svc("github", vec![])],
        );
        let ghost = graph
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Suggested)
            .unwrap();
        assert_eq!(ghost.id, "suggested:github");
        assert!(graph
            .edges
            .iter()
            .any(|e| e.kind == EdgeKind::CatalogDependency && e.target == ghost.id));
    }

    #[test]
    fn output_is_deterministic() {
        let project = Uuid::new_v4();
        let services = vec![attached(project, "vercel"), attached(project, "stripe")];
        let catalog = vec![
            svc("vercel", vec!["github"]),
            svc("stripe", vec!["supabase"]),
            svc("github", vec![]),
            svc("supabase", vec![]),
        ];
        let a = build_graph("demo", &services, &[], &catalog);
        let b = build_graph("demo", &services, &[], &catalog);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
