//! Convergence executor.
//!
//! Walks the catalog once in topological order. For each node: skip it if a
//! predecessor failed, otherwise `check`, and `apply` on divergence. Changes
//! arm the node's notify targets; an armed target is refreshed exactly once
//! when the walk reaches it, after every source has been evaluated.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::catalog::Catalog;
use crate::core::graph::Graph;
use crate::core::resource::{Node, Resource, ResourceId};
use crate::core::types::{ConvergeReport, NodeOutcome, NodeStatus};

/// Kind-specific evaluation against the host.
pub trait Provider {
    /// True if `node` already holds its desired state.
    fn check(&self, node: &Node) -> Result<bool>;
    /// Bring `node` into its desired state.
    fn apply(&self, node: &Node) -> Result<()>;
    /// React to a notification (restart, re-run).
    fn refresh(&self, node: &Node) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvergeOptions {
    /// Evaluate only; never apply or refresh.
    pub noop: bool,
}

/// Run one convergence pass over `catalog`.
#[instrument(skip_all, fields(nodes = catalog.graph().len(), noop = options.noop))]
pub fn converge<P: Provider + ?Sized>(
    catalog: &Catalog,
    provider: &P,
    options: &ConvergeOptions,
) -> ConvergeReport {
    let graph = catalog.graph();
    let mut statuses: Vec<Option<NodeStatus>> = vec![None; graph.len()];
    let mut armed: BTreeSet<usize> = BTreeSet::new();
    let mut outcomes = Vec::with_capacity(graph.len());

    for &idx in catalog.order() {
        let node = graph.node_at(idx);
        let notified = armed.remove(&idx);
        let status = match blocked_by(graph, &statuses, idx) {
            Some(cause) => NodeStatus::Skipped { cause },
            None => evaluate(node, provider, notified, options.noop),
        };

        match &status {
            NodeStatus::Failed { error } => warn!(node = %node.id, %error, "node failed"),
            NodeStatus::Skipped { cause } => {
                warn!(node = %node.id, cause = %cause, "skipped after failed dependency");
            }
            NodeStatus::InSync => debug!(node = %node.id, "in sync"),
            other => info!(node = %node.id, status = other.label(), "node changed"),
        }
        if status.is_change() {
            armed.extend(graph.notify_targets(idx));
        }

        outcomes.push(NodeOutcome {
            id: node.id.clone(),
            kind: node.kind(),
            status: status.clone(),
        });
        statuses[idx] = Some(status);
    }

    ConvergeReport {
        noop: options.noop,
        outcomes,
    }
}

/// First predecessor that failed or was skipped, if any.
fn blocked_by(graph: &Graph, statuses: &[Option<NodeStatus>], idx: usize) -> Option<ResourceId> {
    graph
        .predecessors(idx)
        .find(|&pred| statuses[pred].as_ref().is_some_and(NodeStatus::is_failure))
        .map(|pred| graph.node_at(pred).id.clone())
}

fn evaluate<P: Provider + ?Sized>(
    node: &Node,
    provider: &P,
    notified: bool,
    noop: bool,
) -> NodeStatus {
    if matches!(node.resource, Resource::Class) {
        return NodeStatus::InSync;
    }
    if node.is_refresh_only() {
        return if notified {
            refresh(node, provider, noop)
        } else {
            NodeStatus::InSync
        };
    }

    let in_sync = match provider.check(node) {
        Ok(in_sync) => in_sync,
        Err(err) => return failed(&err),
    };
    if !in_sync {
        if noop {
            return NodeStatus::PendingChange;
        }
        // A fresh apply already picks up whatever the notification was about.
        return match provider.apply(node) {
            Ok(()) => NodeStatus::Changed,
            Err(err) => failed(&err),
        };
    }
    if notified {
        return refresh(node, provider, noop);
    }
    NodeStatus::InSync
}

fn refresh<P: Provider + ?Sized>(node: &Node, provider: &P, noop: bool) -> NodeStatus {
    if noop {
        return NodeStatus::PendingRefresh;
    }
    match provider.refresh(node) {
        Ok(()) => NodeStatus::Refreshed,
        Err(err) => failed(&err),
    }
}

fn failed(err: &anyhow::Error) -> NodeStatus {
    NodeStatus::Failed {
        error: format!("{err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use anyhow::anyhow;

    use crate::core::resource::{ExecSpec, ResourceKind};
    use crate::core::types::ConvergeStatus;

    /// Provider over an in-memory set of in-sync node titles.
    #[derive(Default)]
    struct FakeProvider {
        in_sync: RefCell<BTreeSet<String>>,
        failing: BTreeSet<String>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeProvider {
        fn failing(titles: &[&str]) -> Self {
            Self {
                failing: titles.iter().map(|t| t.to_string()).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl Provider for FakeProvider {
        fn check(&self, node: &Node) -> Result<bool> {
            Ok(self.in_sync.borrow().contains(&node.id.title))
        }

        fn apply(&self, node: &Node) -> Result<()> {
            self.calls.borrow_mut().push(format!("apply {}", node.id));
            if self.failing.contains(&node.id.title) {
                return Err(anyhow!("{} exploded", node.id.title));
            }
            self.in_sync.borrow_mut().insert(node.id.title.clone());
            Ok(())
        }

        fn refresh(&self, node: &Node) -> Result<()> {
            self.calls.borrow_mut().push(format!("refresh {}", node.id));
            Ok(())
        }
    }

    fn line(title: &str) -> Node {
        Node::file_line(title, "/etc/x.toml", format!("{title} = 1"), "^x").expect("line")
    }

    /// Three fragments notifying one service, with the service already running.
    fn fragments_catalog() -> Catalog {
        let mut graph = Graph::new();
        let service = Node::service("svc");
        let lines: Vec<ResourceId> = ["a", "b", "c"]
            .iter()
            .map(|title| graph.add(line(title)).expect("add"))
            .collect();
        let service = graph.add(service).expect("add");
        for line in &lines {
            graph.notify(line, &service).expect("edge");
        }
        Catalog::new(graph).expect("catalog")
    }

    fn refresh_count(calls: &[String], target: &str) -> usize {
        calls
            .iter()
            .filter(|call| *call == &format!("refresh {target}"))
            .count()
    }

    #[test]
    fn notify_target_refreshes_once_for_many_sources() {
        let provider = FakeProvider::default();
        provider.in_sync.borrow_mut().insert("svc".to_string());

        let report = converge(&fragments_catalog(), &provider, &ConvergeOptions::default());

        assert_eq!(report.status(), ConvergeStatus::Changed);
        assert_eq!(refresh_count(&provider.calls(), "Service[svc]"), 1);
        let service = ResourceId::new(ResourceKind::Service, "svc");
        assert_eq!(
            report.outcome(&service).expect("service").status,
            NodeStatus::Refreshed
        );
    }

    #[test]
    fn second_pass_is_converged() {
        let provider = FakeProvider::default();
        provider.in_sync.borrow_mut().insert("svc".to_string());
        let catalog = fragments_catalog();

        converge(&catalog, &provider, &ConvergeOptions::default());
        let second = converge(&catalog, &provider, &ConvergeOptions::default());

        assert_eq!(second.status(), ConvergeStatus::Converged);
        assert_eq!(refresh_count(&provider.calls(), "Service[svc]"), 1);
    }

    #[test]
    fn applied_target_is_not_refreshed_again() {
        let provider = FakeProvider::default();
        let report = converge(&fragments_catalog(), &provider, &ConvergeOptions::default());

        let service = ResourceId::new(ResourceKind::Service, "svc");
        assert_eq!(
            report.outcome(&service).expect("service").status,
            NodeStatus::Changed
        );
        assert_eq!(refresh_count(&provider.calls(), "Service[svc]"), 0);
    }

    #[test]
    fn failure_skips_dependents_but_not_siblings() {
        let mut graph = Graph::new();
        let package = graph.add(Node::class("pkg")).expect("add");
        let broken = graph.add(line("broken")).expect("add");
        let after_broken = graph.add(line("after_broken")).expect("add");
        let sibling = graph.add(line("sibling")).expect("add");
        graph.require(&broken, &package).expect("edge");
        graph.require(&after_broken, &broken).expect("edge");
        graph.require(&sibling, &package).expect("edge");
        let catalog = Catalog::new(graph).expect("catalog");

        let provider = FakeProvider::failing(&["broken"]);
        let report = converge(&catalog, &provider, &ConvergeOptions::default());

        assert_eq!(report.status(), ConvergeStatus::Failed);
        assert!(matches!(
            report.outcome(&broken).expect("broken").status,
            NodeStatus::Failed { .. }
        ));
        assert_eq!(
            report.outcome(&after_broken).expect("after").status,
            NodeStatus::Skipped {
                cause: broken.clone()
            }
        );
        assert_eq!(
            report.outcome(&sibling).expect("sibling").status,
            NodeStatus::Changed
        );
        assert!(
            !provider
                .calls()
                .contains(&format!("apply {after_broken}"))
        );
    }

    #[test]
    fn refresh_only_exec_waits_for_notification() {
        let mut graph = Graph::new();
        let restart = ExecSpec {
            argv: vec!["restart".to_string()],
            refresh_only: true,
            unless: None,
        };
        graph.add(Node::exec("restart", restart)).expect("add");
        let catalog = Catalog::new(graph).expect("catalog");

        let provider = FakeProvider::default();
        let report = converge(&catalog, &provider, &ConvergeOptions::default());

        assert_eq!(report.status(), ConvergeStatus::Converged);
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn noop_reports_without_touching_the_host() {
        let provider = FakeProvider::default();
        provider.in_sync.borrow_mut().insert("svc".to_string());

        let report = converge(
            &fragments_catalog(),
            &provider,
            &ConvergeOptions { noop: true },
        );

        assert!(provider.calls().is_empty());
        assert_eq!(report.status(), ConvergeStatus::Changed);
        let service = ResourceId::new(ResourceKind::Service, "svc");
        assert_eq!(
            report.outcome(&service).expect("service").status,
            NodeStatus::PendingRefresh
        );
    }
}
