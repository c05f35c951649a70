//! Outcome types for a convergence pass.
//!
//! Outcomes are recorded in application order so serialized reports are
//! stable across runs with the same catalog.

use serde::Serialize;

use crate::core::resource::{ResourceId, ResourceKind};

/// What happened to one node during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeStatus {
    /// Already in the desired state (or nothing to do).
    InSync,
    /// Applied successfully.
    Changed,
    /// Refresh action ran after a notification.
    Refreshed,
    /// Noop: would be applied.
    PendingChange,
    /// Noop: would be refreshed.
    PendingRefresh,
    Failed { error: String },
    /// Not attempted because a predecessor failed or was skipped.
    Skipped { cause: ResourceId },
}

impl NodeStatus {
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            NodeStatus::Changed
                | NodeStatus::Refreshed
                | NodeStatus::PendingChange
                | NodeStatus::PendingRefresh
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, NodeStatus::Failed { .. } | NodeStatus::Skipped { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            NodeStatus::InSync => "in-sync",
            NodeStatus::Changed => "changed",
            NodeStatus::Refreshed => "refreshed",
            NodeStatus::PendingChange => "pending",
            NodeStatus::PendingRefresh => "pending-refresh",
            NodeStatus::Failed { .. } => "failed",
            NodeStatus::Skipped { .. } => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutcome {
    pub id: ResourceId,
    pub kind: ResourceKind,
    #[serde(flatten)]
    pub status: NodeStatus,
}

/// Terminal state of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergeStatus {
    Converged,
    Changed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConvergeReport {
    pub noop: bool,
    pub outcomes: Vec<NodeOutcome>,
}

impl ConvergeReport {
    pub fn status(&self) -> ConvergeStatus {
        if self.outcomes.iter().any(|o| o.status.is_failure()) {
            ConvergeStatus::Failed
        } else if self.has_changes() {
            ConvergeStatus::Changed
        } else {
            ConvergeStatus::Converged
        }
    }

    pub fn has_changes(&self) -> bool {
        self.outcomes.iter().any(|o| o.status.is_change())
    }

    pub fn outcome(&self, id: &ResourceId) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| &o.id == id)
    }

    pub fn changed(&self) -> impl Iterator<Item = &NodeOutcome> + '_ {
        self.outcomes.iter().filter(|o| o.status.is_change())
    }

    pub fn failures(&self) -> impl Iterator<Item = &NodeOutcome> + '_ {
        self.outcomes.iter().filter(|o| o.status.is_failure())
    }

    /// Human-readable report, one line per node that did something.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for outcome in &self.outcomes {
            match &outcome.status {
                NodeStatus::InSync => continue,
                NodeStatus::Failed { error } => {
                    out.push_str(&format!("{:<16}{}: {error}\n", "failed", outcome.id));
                }
                NodeStatus::Skipped { cause } => {
                    out.push_str(&format!(
                        "{:<16}{} (dependency {cause} failed)\n",
                        "skipped", outcome.id
                    ));
                }
                status => out.push_str(&format!("{:<16}{}\n", status.label(), outcome.id)),
            }
        }
        let status = match self.status() {
            ConvergeStatus::Converged => "converged",
            ConvergeStatus::Changed if self.noop => "changes pending",
            ConvergeStatus::Changed => "changed",
            ConvergeStatus::Failed => "failed",
        };
        out.push_str(&format!(
            "{status}: {} changed, {} failed, {} total\n",
            self.changed().count(),
            self.failures().count(),
            self.outcomes.len()
        ));
        out
    }
}
