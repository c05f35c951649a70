//! Resource dependency graph.
//!
//! Nodes are stored in declaration order; that order breaks ties in the
//! topological sort so the same declarations always produce the same walk.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use serde::Serialize;

use crate::core::error::SpecError;
use crate::core::resource::{Node, ResourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// `source` must be applied before `target`.
    Requires,
    /// `target` is refreshed when `source` changes; also orders `source` first.
    Notifies,
}

/// Directed edge, always pointing in application order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub source: ResourceId,
    pub target: ResourceId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct IndexEdge {
    source: usize,
    target: usize,
    kind: EdgeKind,
}

#[derive(Debug, Default, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<ResourceId, usize>,
    edges: Vec<IndexEdge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; ids must be unique.
    pub fn add(&mut self, node: Node) -> Result<ResourceId, SpecError> {
        let id = node.id.clone();
        if self.index.contains_key(&id) {
            return Err(SpecError::DuplicateResource(id));
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(id)
    }

    /// Record that `dependent` requires `dependency`.
    pub fn require(
        &mut self,
        dependent: &ResourceId,
        dependency: &ResourceId,
    ) -> Result<(), SpecError> {
        self.connect(dependency, dependent, EdgeKind::Requires)
    }

    /// Record that `source` notifies `target`.
    pub fn notify(&mut self, source: &ResourceId, target: &ResourceId) -> Result<(), SpecError> {
        self.connect(source, target, EdgeKind::Notifies)
    }

    fn connect(
        &mut self,
        source: &ResourceId,
        target: &ResourceId,
        kind: EdgeKind,
    ) -> Result<(), SpecError> {
        let edge = IndexEdge {
            source: self.position(source)?,
            target: self.position(target)?,
            kind,
        };
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
        Ok(())
    }

    fn position(&self, id: &ResourceId) -> Result<usize, SpecError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| SpecError::UnknownResource(id.clone()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: &ResourceId) -> Option<&Node> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn node_at(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edges.iter().map(|edge| Edge {
            source: self.nodes[edge.source].id.clone(),
            target: self.nodes[edge.target].id.clone(),
            kind: edge.kind,
        })
    }

    /// Indices of nodes with an edge of any kind into `idx`.
    pub fn predecessors(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .iter()
            .filter(move |edge| edge.target == idx)
            .map(|edge| edge.source)
    }

    /// Indices of nodes `idx` notifies.
    pub fn notify_targets(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .iter()
            .filter(move |edge| edge.source == idx && edge.kind == EdgeKind::Notifies)
            .map(|edge| edge.target)
    }

    /// True if a direct edge of `kind` runs from `source` to `target`.
    pub fn has_edge(&self, source: &ResourceId, target: &ResourceId, kind: EdgeKind) -> bool {
        match (self.index.get(source), self.index.get(target)) {
            (Some(&source), Some(&target)) => self.edges.contains(&IndexEdge {
                source,
                target,
                kind,
            }),
            _ => false,
        }
    }

    /// True if `target` is reachable from `source` along any edges.
    pub fn precedes(&self, source: &ResourceId, target: &ResourceId) -> bool {
        let (Some(&start), Some(&goal)) = (self.index.get(source), self.index.get(target)) else {
            return false;
        };
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            for edge in self.edges.iter().filter(|edge| edge.source == idx) {
                if edge.target == goal {
                    return true;
                }
                if !seen[edge.target] {
                    seen[edge.target] = true;
                    stack.push(edge.target);
                }
            }
        }
        false
    }

    /// Kahn's algorithm, picking the earliest-declared ready node first.
    ///
    /// Errors with every node left unordered when the graph has a cycle.
    pub fn topological_order(&self) -> Result<Vec<usize>, SpecError> {
        let mut indegree = vec![0usize; self.nodes.len()];
        for edge in &self.edges {
            indegree[edge.target] += 1;
        }
        let mut ready: BinaryHeap<Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(idx);
            for edge in self.edges.iter().filter(|edge| edge.source == idx) {
                indegree[edge.target] -= 1;
                if indegree[edge.target] == 0 {
                    ready.push(Reverse(edge.target));
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = indegree
                .iter()
                .enumerate()
                .filter(|(_, degree)| **degree > 0)
                .map(|(idx, _)| self.nodes[idx].id.clone())
                .collect();
            return Err(SpecError::Cycle(stuck));
        }
        Ok(order)
    }
}
