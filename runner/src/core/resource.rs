//! Declarative resource nodes.
//!
//! A [`Node`] pairs a stable [`ResourceId`] (kind + title) with the desired
//! state for that kind. Nodes are built only through the constructors here so
//! the id kind always matches the payload variant.

use std::fmt;
use std::path::PathBuf;

use regex::Regex;
use serde::Serialize;

use crate::core::error::SpecError;
use crate::core::platform::RepoDescriptor;

/// Resource kinds understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Grouping node with no action of its own.
    Class,
    Repository,
    Package,
    File,
    /// One managed line within a file.
    FileLine,
    Service,
    /// External command.
    Exec,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Class => "Class",
            ResourceKind::Repository => "Repository",
            ResourceKind::Package => "Package",
            ResourceKind::File => "File",
            ResourceKind::FileLine => "FileLine",
            ResourceKind::Service => "Service",
            ResourceKind::Exec => "Exec",
        }
    }
}

/// Composite identity of a node, rendered as `Kind[title]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub title: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind.as_str(), self.title)
    }
}

/// Which package version must be installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageEnsure {
    /// Any installed version satisfies the node.
    Installed,
    /// Exactly this version.
    Version(String),
}

impl PackageEnsure {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "installed" | "present" => PackageEnsure::Installed,
            version => PackageEnsure::Version(version.to_string()),
        }
    }

    pub fn is_satisfied_by(&self, installed: Option<&str>) -> bool {
        match (self, installed) {
            (_, None) => false,
            (PackageEnsure::Installed, Some(_)) => true,
            (PackageEnsure::Version(want), Some(have)) => want == have,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSpec {
    pub name: String,
    pub ensure: PackageEnsure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSpec {
    pub path: PathBuf,
}

/// A single managed line.
#[derive(Debug, Clone, Serialize)]
pub struct FileLine {
    pub path: PathBuf,
    pub line: String,
    /// Source text of `matcher`.
    pub pattern: String,
    #[serde(skip)]
    pub matcher: Regex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    pub name: String,
    pub running: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecSpec {
    pub argv: Vec<String>,
    /// Only runs when notified.
    pub refresh_only: bool,
    /// Skip the command when this guard exits successfully.
    pub unless: Option<Vec<String>>,
}

impl ExecSpec {
    /// Command line as a single space-joined string.
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// Desired state payload, one variant per [`ResourceKind`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    Class,
    Repository(RepoDescriptor),
    Package(PackageSpec),
    File(FileSpec),
    FileLine(FileLine),
    Service(ServiceSpec),
    Exec(ExecSpec),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Class => ResourceKind::Class,
            Resource::Repository(_) => ResourceKind::Repository,
            Resource::Package(_) => ResourceKind::Package,
            Resource::File(_) => ResourceKind::File,
            Resource::FileLine(_) => ResourceKind::FileLine,
            Resource::Service(_) => ResourceKind::Service,
            Resource::Exec(_) => ResourceKind::Exec,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: ResourceId,
    pub resource: Resource,
}

impl Node {
    fn new(title: impl Into<String>, resource: Resource) -> Self {
        Self {
            id: ResourceId::new(resource.kind(), title),
            resource,
        }
    }

    pub fn class(title: &str) -> Self {
        Self::new(title, Resource::Class)
    }

    pub fn repository(descriptor: RepoDescriptor) -> Self {
        Self::new(descriptor.name().to_string(), Resource::Repository(descriptor))
    }

    pub fn package(name: &str, ensure: PackageEnsure) -> Self {
        Self::new(
            name,
            Resource::Package(PackageSpec {
                name: name.to_string(),
                ensure,
            }),
        )
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(
            path.display().to_string(),
            Resource::File(FileSpec { path }),
        )
    }

    /// Build a line fragment, compiling `pattern` up front.
    pub fn file_line(
        title: &str,
        path: impl Into<PathBuf>,
        line: impl Into<String>,
        pattern: &str,
    ) -> Result<Self, SpecError> {
        let matcher = Regex::new(pattern).map_err(|err| SpecError::InvalidPattern {
            id: ResourceId::new(ResourceKind::FileLine, title),
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self::new(
            title,
            Resource::FileLine(FileLine {
                path: path.into(),
                line: line.into(),
                pattern: pattern.to_string(),
                matcher,
            }),
        ))
    }

    pub fn service(name: &str) -> Self {
        Self::new(
            name,
            Resource::Service(ServiceSpec {
                name: name.to_string(),
                running: true,
                enabled: true,
            }),
        )
    }

    pub fn exec(title: &str, spec: ExecSpec) -> Self {
        Self::new(title, Resource::Exec(spec))
    }

    pub fn kind(&self) -> ResourceKind {
        self.id.kind
    }

    /// True for commands that only run when notified.
    pub fn is_refresh_only(&self) -> bool {
        matches!(&self.resource, Resource::Exec(exec) if exec.refresh_only)
    }
}
