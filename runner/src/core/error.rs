//! Error taxonomy for catalog construction and convergence.
//!
//! [`SpecError`] is raised before anything touches the host. [`ApplyError`]
//! describes why a single node failed to converge; it is always wrapped in
//! the node's outcome and never aborts unrelated branches.

use thiserror::Error;

use crate::core::resource::ResourceId;

/// Invalid declared configuration. Fatal before any apply.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("duplicate resource {0}")]
    DuplicateResource(ResourceId),

    #[error("edge references unknown resource {0}")]
    UnknownResource(ResourceId),

    #[error("dependency cycle between {}", join_ids(.0))]
    Cycle(Vec<ResourceId>),

    #[error("runner '{runner}': unknown ensure value '{value}' (expected present or absent)")]
    UnknownEnsure { runner: String, value: String },

    #[error("runners '{first}' and '{second}' both resolve to name '{name}'")]
    DuplicateRunnerName {
        name: String,
        first: String,
        second: String,
    },

    #[error("runner '{runner}': option '{option}' {reason}")]
    InvalidOption {
        runner: String,
        option: String,
        reason: String,
    },

    #[error("invalid match pattern '{pattern}' for {id}: {reason}")]
    InvalidPattern {
        id: ResourceId,
        pattern: String,
        reason: String,
    },

    #[error("{field} {reason}")]
    InvalidField { field: String, reason: String },

    #[error("platform is missing '{fact}' required for {purpose}")]
    MissingFact { fact: String, purpose: String },
}

fn join_ids(ids: &[ResourceId]) -> String {
    ids.iter()
        .map(ResourceId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why a collaborator could not bring a node into its desired state.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("no {capability} support for os family '{family}'")]
    CollaboratorUnavailable { capability: String, family: String },

    #[error("`{command}` exited with status {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out")]
    CommandTimedOut { command: String },

    #[error("{count} lines in {path} match /{pattern}/")]
    AmbiguousMatch {
        path: String,
        pattern: String,
        count: usize,
    },
}
