//! Catalog construction: declared [`Spec`] to a validated resource DAG.
//!
//! Structure produced for every spec:
//!
//! ```text
//! [Repository.. -> Class[repo]] -> Package -> Class[install]
//!   -> File[config] -> Class[config] -> FileLine.. ~> Service
//!   Package -> Exec[gitlab-runner-restart]
//!   [Exec[docker-image-..] -> Class[docker]] -> Exec[(Un)Register_runner_..] ~> Exec[gitlab-runner-restart]
//! ```
//!
//! `->` is a requires edge, `~>` a notify edge.

use crate::core::error::SpecError;
use crate::core::graph::Graph;
use crate::core::platform::{Platform, repo_descriptors};
use crate::core::registration;
use crate::core::resource::{ExecSpec, Node, PackageEnsure, ResourceId, ResourceKind};
use crate::core::spec::Spec;

pub const REPO_CLASS: &str = "repo";
pub const INSTALL_CLASS: &str = "install";
pub const CONFIG_CLASS: &str = "config";
pub const DOCKER_CLASS: &str = "docker";
pub const RESTART_EXEC: &str = "gitlab-runner-restart";

/// Global options managed as single lines of the config file.
struct GlobalLine {
    title: &'static str,
    key: &'static str,
    pattern: &'static str,
}

const CONCURRENT: GlobalLine = GlobalLine {
    title: "gitlab-runner-concurrent",
    key: "concurrent",
    pattern: r"^concurrent = \d+",
};

const QUOTED_LINES: [GlobalLine; 5] = [
    GlobalLine {
        title: "gitlab-runner-metrics_server",
        key: "metrics_server",
        pattern: "^metrics_server = .+",
    },
    GlobalLine {
        title: "gitlab-runner-listen-address",
        key: "listen_address",
        pattern: "^listen_address = .+",
    },
    GlobalLine {
        title: "gitlab-runner-builds_dir",
        key: "builds_dir",
        pattern: "^builds_dir = .+",
    },
    GlobalLine {
        title: "gitlab-runner-cache_dir",
        key: "cache_dir",
        pattern: "^cache_dir = .+",
    },
    GlobalLine {
        title: "gitlab-runner-sentry_dsn",
        key: "sentry_dsn",
        pattern: "^sentry_dsn = .+",
    },
];

/// An acyclic resource graph together with its application order.
#[derive(Debug, Clone)]
pub struct Catalog {
    graph: Graph,
    order: Vec<usize>,
}

impl Catalog {
    /// Validate `graph` and fix its order. Fails on cycles.
    pub fn new(graph: Graph) -> Result<Self, SpecError> {
        let order = graph.topological_order()?;
        Ok(Self { graph, order })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Node indices in application order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Nodes in application order.
    pub fn ordered_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order.iter().map(|&idx| self.graph.node_at(idx))
    }
}

pub fn class_id(title: &str) -> ResourceId {
    ResourceId::new(ResourceKind::Class, title)
}

/// Build the catalog for `spec` on `platform`.
pub fn build_catalog(spec: &Spec, platform: &Platform) -> Result<Catalog, SpecError> {
    spec.validate()?;
    let runners = spec.resolve_runners()?;
    let mut graph = Graph::new();

    let repo = if spec.manage_repo {
        let mut members = Vec::new();
        for descriptor in repo_descriptors(platform, &spec.repo_base_url)? {
            members.push(graph.add(Node::repository(descriptor))?);
        }
        let repo = graph.add(Node::class(REPO_CLASS))?;
        for member in &members {
            graph.require(&repo, member)?;
        }
        Some(repo)
    } else {
        None
    };

    let package = graph.add(Node::package(
        &spec.package_name,
        PackageEnsure::parse(&spec.package_ensure),
    ))?;
    if let Some(repo) = &repo {
        graph.require(&package, repo)?;
    }
    let install = graph.add(Node::class(INSTALL_CLASS))?;
    graph.require(&install, &package)?;

    let config_file = graph.add(Node::file(&spec.config_path))?;
    graph.require(&config_file, &install)?;
    let config = graph.add(Node::class(CONFIG_CLASS))?;
    graph.require(&config, &install)?;
    graph.require(&config, &config_file)?;

    let mut fragments = Vec::new();
    if let Some(concurrent) = spec.concurrent {
        fragments.push(graph.add(Node::file_line(
            CONCURRENT.title,
            &spec.config_path,
            format!("{} = {concurrent}", CONCURRENT.key),
            CONCURRENT.pattern,
        )?)?);
    }
    let quoted_values = [
        &spec.metrics_server,
        &spec.listen_address,
        &spec.builds_dir,
        &spec.cache_dir,
        &spec.sentry_dsn,
    ];
    for (global, value) in QUOTED_LINES.iter().zip(quoted_values) {
        let Some(value) = value else {
            continue;
        };
        fragments.push(graph.add(Node::file_line(
            global.title,
            &spec.config_path,
            format!("{} = {}", global.key, toml::Value::String(value.clone())),
            global.pattern,
        )?)?);
    }

    let service = graph.add(Node::service(&spec.package_name))?;
    graph.require(&service, &config)?;
    for fragment in &fragments {
        graph.require(fragment, &install)?;
        graph.require(fragment, &config)?;
        graph.notify(fragment, &service)?;
    }

    let restart = graph.add(Node::exec(
        RESTART_EXEC,
        ExecSpec {
            argv: registration::restart_argv(&spec.binary),
            refresh_only: true,
            unless: None,
        },
    ))?;
    graph.require(&restart, &package)?;

    let docker = if spec.manage_docker {
        let mut images = Vec::new();
        for image in &spec.docker_images {
            images.push(graph.add(Node::exec(
                &format!("docker-image-{image}"),
                ExecSpec {
                    argv: vec!["docker".to_string(), "pull".to_string(), image.clone()],
                    refresh_only: false,
                    unless: Some(vec![
                        "docker".to_string(),
                        "image".to_string(),
                        "inspect".to_string(),
                        image.clone(),
                    ]),
                },
            ))?);
        }
        let docker = graph.add(Node::class(DOCKER_CLASS))?;
        for image in &images {
            graph.require(&docker, image)?;
        }
        Some(docker)
    } else {
        None
    };

    for entry in &runners {
        let command = graph.add(Node::exec(
            &registration::node_title(entry),
            ExecSpec {
                argv: registration::argv(&spec.binary, entry),
                refresh_only: false,
                unless: None,
            },
        ))?;
        graph.require(&command, &install)?;
        if let Some(docker) = &docker {
            graph.require(&command, docker)?;
        }
        graph.notify(&command, &restart)?;
    }

    Catalog::new(graph)
}
