//! Host-backed [`Provider`]: dispatches each resource kind to its collaborator.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::converge::Provider;
use crate::core::error::ApplyError;
use crate::core::fragment;
use crate::core::platform::{AptSource, RepoDescriptor};
use crate::core::resource::{ExecSpec, FileLine, Node, PackageEnsure, Resource};
use crate::core::spec::HostSettings;
use crate::io::files::{read_optional, write_atomic};
use crate::io::packages::PackageManager;
use crate::io::process::{ProcessRunner, run_checked};
use crate::io::repo_files::{render_repo_file, repo_file_path};
use crate::io::services::ServiceManager;

pub struct HostProvider<'a> {
    pub packages: &'a dyn PackageManager,
    pub services: &'a dyn ServiceManager,
    pub process: &'a dyn ProcessRunner,
    pub settings: &'a HostSettings,
}

impl Provider for HostProvider<'_> {
    #[instrument(skip_all, fields(node = %node.id))]
    fn check(&self, node: &Node) -> Result<bool> {
        match &node.resource {
            Resource::Class => Ok(true),
            Resource::Repository(repo) => self.repository_in_sync(repo),
            Resource::Package(package) => {
                let installed = self.packages.installed_version(&package.name)?;
                debug!(?installed, "package state");
                Ok(package.ensure.is_satisfied_by(installed.as_deref()))
            }
            Resource::File(file) => Ok(file.path.is_file()),
            Resource::FileLine(line) => {
                let contents = read_optional(&line.path)?.unwrap_or_default();
                Ok(fragment::contains_line(&contents, &line.line))
            }
            Resource::Service(service) => {
                let running = !service.running || self.services.is_running(&service.name)?;
                let enabled = !service.enabled || self.services.is_enabled(&service.name)?;
                Ok(running && enabled)
            }
            Resource::Exec(exec) => self.exec_in_sync(exec),
        }
    }

    #[instrument(skip_all, fields(node = %node.id))]
    fn apply(&self, node: &Node) -> Result<()> {
        match &node.resource {
            Resource::Class => Ok(()),
            Resource::Repository(repo) => self.write_repository(repo),
            Resource::Package(package) => {
                let version = match &package.ensure {
                    PackageEnsure::Installed => None,
                    PackageEnsure::Version(version) => Some(version.as_str()),
                };
                self.packages.install(&package.name, version)
            }
            Resource::File(file) => ensure_file(&file.path),
            Resource::FileLine(line) => write_fragment(line),
            Resource::Service(service) => {
                if service.enabled && !self.services.is_enabled(&service.name)? {
                    self.services.enable(&service.name)?;
                }
                if service.running && !self.services.is_running(&service.name)? {
                    self.services.start(&service.name)?;
                }
                Ok(())
            }
            Resource::Exec(exec) => self.run_exec(exec),
        }
    }

    #[instrument(skip_all, fields(node = %node.id))]
    fn refresh(&self, node: &Node) -> Result<()> {
        match &node.resource {
            Resource::Service(service) => self.services.restart(&service.name),
            Resource::Exec(exec) => self.run_exec(exec),
            _ => Ok(()),
        }
    }
}

impl HostProvider<'_> {
    fn repository_in_sync(&self, repo: &RepoDescriptor) -> Result<bool> {
        let (Some(path), Some(expected)) = (
            repo_file_path(repo, self.settings),
            render_repo_file(repo)?,
        ) else {
            return Ok(false);
        };
        Ok(read_optional(&path)?.as_deref() == Some(expected.as_str()))
    }

    fn write_repository(&self, repo: &RepoDescriptor) -> Result<()> {
        let (Some(path), Some(contents)) = (
            repo_file_path(repo, self.settings),
            render_repo_file(repo)?,
        ) else {
            let family = match repo {
                RepoDescriptor::Unsupported { family, .. } => family.clone(),
                _ => "unknown".to_string(),
            };
            return Err(ApplyError::CollaboratorUnavailable {
                capability: "package repository".to_string(),
                family,
            }
            .into());
        };
        if let RepoDescriptor::Apt(source) = repo {
            self.import_apt_key(source)?;
        }
        info!(path = %path.display(), "writing repository definition");
        write_atomic(&path, &contents)?;
        if matches!(repo, RepoDescriptor::Apt(_)) {
            run_checked(self.process, &argv(&["apt-get", "update"]))?;
        }
        Ok(())
    }

    fn import_apt_key(&self, source: &AptSource) -> Result<()> {
        run_checked(
            self.process,
            &argv(&[
                "apt-key",
                "adv",
                "--keyserver",
                &source.key_server,
                "--recv-keys",
                &source.key_id,
            ]),
        )
        .with_context(|| format!("import apt key {}", source.key_id))?;
        Ok(())
    }

    fn exec_in_sync(&self, exec: &ExecSpec) -> Result<bool> {
        if exec.refresh_only {
            return Ok(true);
        }
        match &exec.unless {
            Some(guard) => {
                let output = self.process.run(guard)?;
                debug!(guard = %guard.join(" "), satisfied = output.success(), "exec guard");
                Ok(output.success())
            }
            None => Ok(false),
        }
    }

    fn run_exec(&self, exec: &ExecSpec) -> Result<()> {
        info!(command = %exec.command_line(), "running exec");
        run_checked(self.process, &exec.argv)?;
        Ok(())
    }
}

fn ensure_file(path: &Path) -> Result<()> {
    if path.is_file() {
        return Ok(());
    }
    info!(path = %path.display(), "creating empty file");
    write_atomic(path, "")
}

fn write_fragment(line: &FileLine) -> Result<()> {
    let contents = read_optional(&line.path)?.unwrap_or_default();
    let updated = fragment::reconcile(&contents, &line.line, &line.matcher).map_err(|ambiguous| {
        ApplyError::AmbiguousMatch {
            path: line.path.display().to_string(),
            pattern: line.pattern.clone(),
            count: ambiguous.matches,
        }
    })?;
    if let Some(updated) = updated {
        info!(path = %line.path.display(), line = %line.line, "writing line");
        write_atomic(&line.path, &updated)?;
    }
    Ok(())
}

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::platform::{OsFamily, Platform, repo_descriptors};
    use crate::test_support::{
        FakePackages, FakeServices, ScriptedProcess, TestHost, redhat_platform,
    };

    struct Fixture {
        host: TestHost,
        packages: FakePackages,
        services: FakeServices,
        process: ScriptedProcess,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                host: TestHost::new(),
                packages: FakePackages::default(),
                services: FakeServices::default(),
                process: ScriptedProcess::new(),
            }
        }

        fn provider(&self) -> HostProvider<'_> {
            HostProvider {
                packages: &self.packages,
                services: &self.services,
                process: &self.process,
                settings: &self.host.settings,
            }
        }
    }

    fn apt_repo() -> Node {
        let platform = Platform {
            family: OsFamily::Debian,
            distro_id: "debian".to_string(),
            codename: Some("bookworm".to_string()),
        };
        let mut repos = repo_descriptors(&platform, "https://packages.gitlab.com").expect("repos");
        Node::repository(repos.remove(0))
    }

    #[test]
    fn apt_repository_imports_key_writes_source_and_updates() {
        let fixture = Fixture::new();
        let provider = fixture.provider();
        let repo = apt_repo();

        assert!(!provider.check(&repo).expect("check"));
        provider.apply(&repo).expect("apply");
        assert!(provider.check(&repo).expect("check"));

        let commands = fixture.process.commands();
        assert!(commands[0].starts_with("apt-key adv --keyserver keys.gnupg.net --recv-keys"));
        assert_eq!(commands[1], "apt-get update");
        let written = fs::read_to_string(
            fixture
                .host
                .settings
                .apt_sources_dir
                .join("apt_gitlabci.list"),
        )
        .expect("source file");
        assert!(written.contains("bookworm main"));
    }

    #[test]
    fn yum_repositories_write_both_files_without_apt_commands() {
        let fixture = Fixture::new();
        let provider = fixture.provider();
        let repos = repo_descriptors(&redhat_platform(), "https://packages.gitlab.com")
            .expect("repos");

        for repo in repos.into_iter().map(Node::repository) {
            assert!(!provider.check(&repo).expect("check"));
            provider.apply(&repo).expect("apply");
            assert!(provider.check(&repo).expect("check"));
        }

        let repos_dir = &fixture.host.settings.yum_repos_dir;
        let binary = fs::read_to_string(repos_dir.join("runner_gitlab-runner.repo"))
            .expect("binary repo");
        assert!(binary.starts_with("[runner_gitlab-runner]\n"));
        assert!(binary.contains("$basearch"));
        let source = fs::read_to_string(repos_dir.join("runner_gitlab-runner-source.repo"))
            .expect("source repo");
        assert!(source.contains("/SRPMS\n"));
        assert!(fixture.process.commands().is_empty());
    }

    #[test]
    fn unsupported_repository_is_collaborator_unavailable() {
        let fixture = Fixture::new();
        let repo = Node::repository(RepoDescriptor::Unsupported {
            name: "gitlab-runner".to_string(),
            family: "arch".to_string(),
        });
        let provider = fixture.provider();
        assert!(!provider.check(&repo).expect("check"));
        let err = provider.apply(&repo).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApplyError>(),
            Some(ApplyError::CollaboratorUnavailable { family, .. }) if family == "arch"
        ));
    }

    #[test]
    fn package_pins_requested_version() {
        let fixture = Fixture::new();
        fixture.packages.set_installed("gitlab-runner", "16.10.0");
        let node = Node::package("gitlab-runner", PackageEnsure::parse("16.11.1"));
        let provider = fixture.provider();

        assert!(!provider.check(&node).expect("check"));
        provider.apply(&node).expect("apply");
        assert!(provider.check(&node).expect("check"));
        assert_eq!(
            fixture.packages.installs(),
            vec!["gitlab-runner=16.11.1".to_string()]
        );
    }

    #[test]
    fn fragment_replaces_matching_line_and_keeps_the_rest() {
        let fixture = Fixture::new();
        let path = fixture.host.config_path();
        write_atomic(&path, "concurrent = 1\n[[runners]]\n  name = \"a\"\n").expect("seed");
        let node = Node::file_line(
            "gitlab-runner-concurrent",
            &path,
            "concurrent = 4",
            "^concurrent = \\d+",
        )
        .expect("node");
        let provider = fixture.provider();

        assert!(!provider.check(&node).expect("check"));
        provider.apply(&node).expect("apply");
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            "concurrent = 4\n[[runners]]\n  name = \"a\"\n"
        );
        assert!(provider.check(&node).expect("check"));
    }

    #[cfg(unix)]
    #[test]
    fn fragment_write_keeps_private_config_mode() {
        use std::os::unix::fs::PermissionsExt;

        let fixture = Fixture::new();
        let path = fixture.host.config_path();
        write_atomic(&path, "concurrent = 1\n").expect("seed");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).expect("chmod");
        let node = Node::file_line("c", &path, "concurrent = 4", r"^concurrent = \d+")
            .expect("node");

        fixture.provider().apply(&node).expect("apply");

        let mode = fs::metadata(&path).expect("stat").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(fs::read_to_string(&path).expect("read"), "concurrent = 4\n");
    }

    #[test]
    fn fragment_with_several_matches_is_ambiguous() {
        let fixture = Fixture::new();
        let path = fixture.host.config_path();
        write_atomic(&path, "concurrent = 1\nconcurrent = 2\n").expect("seed");
        let node = Node::file_line("c", &path, "concurrent = 4", "^concurrent = ").expect("node");

        let err = fixture.provider().apply(&node).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApplyError>(),
            Some(ApplyError::AmbiguousMatch { count: 2, .. })
        ));
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            "concurrent = 1\nconcurrent = 2\n"
        );
    }

    #[test]
    fn config_file_is_created_empty() {
        let fixture = Fixture::new();
        let node = Node::file(fixture.host.config_path());
        let provider = fixture.provider();
        assert!(!provider.check(&node).expect("check"));
        provider.apply(&node).expect("apply");
        assert!(provider.check(&node).expect("check"));
        assert_eq!(
            fs::read_to_string(fixture.host.config_path()).expect("read"),
            ""
        );
    }

    #[test]
    fn service_is_enabled_started_and_restarted() {
        let fixture = Fixture::new();
        let node = Node::service("gitlab-runner");
        let provider = fixture.provider();

        assert!(!provider.check(&node).expect("check"));
        provider.apply(&node).expect("apply");
        assert!(provider.check(&node).expect("check"));
        provider.refresh(&node).expect("refresh");
        assert_eq!(
            fixture.services.actions(),
            vec![
                "enable gitlab-runner".to_string(),
                "start gitlab-runner".to_string(),
                "restart gitlab-runner".to_string(),
            ]
        );
    }

    #[test]
    fn exec_guard_success_means_in_sync() {
        let fixture = Fixture::new();
        fixture.process.respond("docker image inspect", 1, "");
        let node = Node::exec(
            "docker-pull-ubuntu",
            ExecSpec {
                argv: argv(&["docker", "pull", "ubuntu"]),
                refresh_only: false,
                unless: Some(argv(&["docker", "image", "inspect", "ubuntu"])),
            },
        );
        let provider = fixture.provider();
        assert!(!provider.check(&node).expect("check"));
        provider.apply(&node).expect("apply");
        assert_eq!(
            fixture.process.commands(),
            vec![
                "docker image inspect ubuntu".to_string(),
                "docker pull ubuntu".to_string(),
            ]
        );
    }

    #[test]
    fn failing_exec_surfaces_command_failure() {
        let fixture = Fixture::new();
        fixture
            .process
            .fail("/usr/bin/gitlab-runner register", 1, "bad token");
        let node = Node::exec(
            "Register_runner_a",
            ExecSpec {
                argv: argv(&["/usr/bin/gitlab-runner", "register", "--non-interactive"]),
                refresh_only: false,
                unless: None,
            },
        );
        let provider = fixture.provider();
        assert!(!provider.check(&node).expect("check"));
        let err = provider.apply(&node).unwrap_err();
        assert!(format!("{err:#}").contains("bad token"));
    }
}
