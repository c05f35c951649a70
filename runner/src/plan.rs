//! `plan` command: show the catalog a spec produces without touching the host.

use serde::Serialize;

use crate::core::catalog::{Catalog, build_catalog};
use crate::core::error::SpecError;
use crate::core::graph::{Edge, EdgeKind};
use crate::core::platform::Platform;
use crate::core::resource::Node;
use crate::core::spec::Spec;

/// Nodes in application order plus every edge between them.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub platform: Platform,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Plan {
    pub fn from_catalog(catalog: &Catalog, platform: &Platform) -> Self {
        Self {
            platform: platform.clone(),
            nodes: catalog.ordered_nodes().cloned().collect(),
            edges: catalog.graph().edges().collect(),
        }
    }

    /// Text listing: each node followed by its incoming requires and outgoing
    /// notifies edges.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (position, node) in self.nodes.iter().enumerate() {
            out.push_str(&format!("{:>3}. {}\n", position + 1, node.id));
            for edge in &self.edges {
                match edge.kind {
                    EdgeKind::Requires if edge.target == node.id => {
                        out.push_str(&format!("       requires {}\n", edge.source));
                    }
                    EdgeKind::Notifies if edge.source == node.id => {
                        out.push_str(&format!("       notifies {}\n", edge.target));
                    }
                    _ => {}
                }
            }
        }
        out
    }
}

/// Build the plan for `spec` on `platform`.
pub fn plan(spec: &Spec, platform: &Platform) -> Result<Plan, SpecError> {
    let catalog = build_catalog(spec, platform)?;
    Ok(Plan::from_catalog(&catalog, platform))
}
