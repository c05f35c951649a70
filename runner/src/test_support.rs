//! Test-only collaborators and fixtures.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::core::platform::{OsFamily, Platform};
use crate::core::spec::{HostSettings, Spec};
use crate::io::packages::PackageManager;
use crate::io::process::{ProcessOutput, ProcessRunner};
use crate::io::services::ServiceManager;

struct Scripted {
    prefix: String,
    output: ProcessOutput,
}

/// Process runner answering from scripted responses.
///
/// Commands are matched by prefix of their space-joined argv; the most recent
/// matching script wins. Unscripted commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedProcess {
    scripts: RefCell<Vec<Scripted>>,
    commands: RefCell<Vec<String>>,
}

impl ScriptedProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `code` and `stdout`.
    pub fn respond(&self, prefix: &str, code: i32, stdout: &str) {
        self.script(prefix, code, stdout, "");
    }

    /// Answer commands starting with `prefix` with `code` and `stderr`.
    pub fn fail(&self, prefix: &str, code: i32, stderr: &str) {
        self.script(prefix, code, "", stderr);
    }

    /// Every command run so far, space-joined.
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    fn script(&self, prefix: &str, code: i32, stdout: &str, stderr: &str) {
        self.scripts.borrow_mut().push(Scripted {
            prefix: prefix.to_string(),
            output: ProcessOutput {
                code: Some(code),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                timed_out: false,
            },
        });
    }
}

impl ProcessRunner for ScriptedProcess {
    fn run(&self, argv: &[String]) -> Result<ProcessOutput> {
        let command = argv.join(" ");
        self.commands.borrow_mut().push(command.clone());
        let scripts = self.scripts.borrow();
        let output = scripts
            .iter()
            .rev()
            .find(|script| command.starts_with(&script.prefix))
            .map(|script| script.output.clone())
            .unwrap_or(ProcessOutput {
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
                timed_out: false,
            });
        Ok(output)
    }
}

/// In-memory package database.
#[derive(Default)]
pub struct FakePackages {
    installed: RefCell<BTreeMap<String, String>>,
    installs: RefCell<Vec<String>>,
}

impl FakePackages {
    pub fn set_installed(&self, name: &str, version: &str) {
        self.installed
            .borrow_mut()
            .insert(name.to_string(), version.to_string());
    }

    /// Install requests as `name` or `name=version`.
    pub fn installs(&self) -> Vec<String> {
        self.installs.borrow().clone()
    }
}

impl PackageManager for FakePackages {
    fn installed_version(&self, name: &str) -> Result<Option<String>> {
        Ok(self.installed.borrow().get(name).cloned())
    }

    fn install(&self, name: &str, version: Option<&str>) -> Result<()> {
        let request = match version {
            Some(version) => format!("{name}={version}"),
            None => name.to_string(),
        };
        self.installs.borrow_mut().push(request);
        self.set_installed(name, version.unwrap_or("1.0.0"));
        Ok(())
    }
}

/// In-memory service state recording every action.
#[derive(Default)]
pub struct FakeServices {
    running: RefCell<BTreeSet<String>>,
    enabled: RefCell<BTreeSet<String>>,
    actions: RefCell<Vec<String>>,
}

impl FakeServices {
    /// Mark `name` as running and enabled.
    pub fn set_active(&self, name: &str) {
        self.running.borrow_mut().insert(name.to_string());
        self.enabled.borrow_mut().insert(name.to_string());
    }

    /// Actions as `verb name`.
    pub fn actions(&self) -> Vec<String> {
        self.actions.borrow().clone()
    }

    fn record(&self, verb: &str, name: &str) {
        self.actions.borrow_mut().push(format!("{verb} {name}"));
    }
}

impl ServiceManager for FakeServices {
    fn is_running(&self, name: &str) -> Result<bool> {
        Ok(self.running.borrow().contains(name))
    }

    fn is_enabled(&self, name: &str) -> Result<bool> {
        Ok(self.enabled.borrow().contains(name))
    }

    fn start(&self, name: &str) -> Result<()> {
        self.record("start", name);
        self.running.borrow_mut().insert(name.to_string());
        Ok(())
    }

    fn enable(&self, name: &str) -> Result<()> {
        self.record("enable", name);
        self.enabled.borrow_mut().insert(name.to_string());
        Ok(())
    }

    fn restart(&self, name: &str) -> Result<()> {
        self.record("restart", name);
        self.running.borrow_mut().insert(name.to_string());
        Ok(())
    }
}

/// Temporary host root holding repository directories and the runner config.
pub struct TestHost {
    pub temp: TempDir,
    pub settings: HostSettings,
}

impl TestHost {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = HostSettings {
            apt_sources_dir: temp.path().join("etc/apt/sources.list.d"),
            yum_repos_dir: temp.path().join("etc/yum.repos.d"),
            ..HostSettings::default()
        };
        Self { temp, settings }
    }

    pub fn config_path(&self) -> PathBuf {
        self.temp.path().join("etc/gitlab-runner/config.toml")
    }

    /// Parse a spec and point its paths into this host.
    pub fn spec(&self, toml_src: &str) -> Result<Spec> {
        let mut spec: Spec = toml::from_str(toml_src).context("parse test spec")?;
        spec.config_path = self.config_path();
        spec.host = self.settings.clone();
        spec.validate()?;
        Ok(spec)
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

pub fn debian_platform() -> Platform {
    Platform {
        family: OsFamily::Debian,
        distro_id: "debian".to_string(),
        codename: Some("bookworm".to_string()),
    }
}

pub fn redhat_platform() -> Platform {
    Platform {
        family: OsFamily::RedHat,
        distro_id: "centos".to_string(),
        codename: None,
    }
}
