//! Declared configuration for a runner host.
//!
//! A [`Spec`] is what the operator writes. It is parsed once per convergence
//! invocation, validated, and then only read. Per-runner options are resolved
//! by a pure merge of `runner_defaults` with each entry's overrides.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::core::error::SpecError;

/// Option map passed through to the registration tool as `--key=value`.
pub type RunnerOptions = BTreeMap<String, toml::Value>;

pub const DEFAULT_PACKAGE_NAME: &str = "gitlab-runner";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/gitlab-runner/config.toml";
pub const DEFAULT_REPO_BASE_URL: &str = "https://packages.gitlab.com";

/// Whether a runner registration should exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    Present,
    Absent,
}

impl Ensure {
    pub fn parse(runner: &str, raw: &str) -> Result<Self, SpecError> {
        match raw {
            "present" => Ok(Ensure::Present),
            "absent" => Ok(Ensure::Absent),
            other => Err(SpecError::UnknownEnsure {
                runner: runner.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// One entry under `[runners.<title>]`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RunnerDecl {
    /// Raw ensure value; checked by [`Spec::resolve_runners`].
    #[serde(default)]
    pub ensure: Option<String>,
    #[serde(flatten)]
    pub options: RunnerOptions,
}

impl RunnerDecl {
    pub fn with_ensure(ensure: &str) -> Self {
        Self {
            ensure: Some(ensure.to_string()),
            options: RunnerOptions::new(),
        }
    }
}

/// Host-side knobs that do not change the declared state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostSettings {
    /// Upper bound for any external command, in seconds.
    pub command_timeout_secs: u64,
    /// Captured stdout/stderr beyond this many bytes is discarded.
    pub output_limit_bytes: usize,
    pub apt_sources_dir: PathBuf,
    pub yum_repos_dir: PathBuf,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: 600,
            output_limit_bytes: 100_000,
            apt_sources_dir: PathBuf::from("/etc/apt/sources.list.d"),
            yum_repos_dir: PathBuf::from("/etc/yum.repos.d"),
        }
    }
}

/// The full declared configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Spec {
    pub concurrent: Option<u32>,
    pub metrics_server: Option<String>,
    pub listen_address: Option<String>,
    pub builds_dir: Option<String>,
    pub cache_dir: Option<String>,
    pub sentry_dsn: Option<String>,
    pub manage_repo: bool,
    pub manage_docker: bool,
    pub docker_images: Vec<String>,
    pub package_name: String,
    /// `installed`, `present`, or an exact version.
    pub package_ensure: String,
    /// Registration binary under `/usr/bin`.
    pub binary: String,
    pub config_path: PathBuf,
    pub repo_base_url: String,
    pub runner_defaults: RunnerOptions,
    pub runners: BTreeMap<String, RunnerDecl>,
    pub host: HostSettings,
}

impl Default for Spec {
    fn default() -> Self {
        Self {
            concurrent: None,
            metrics_server: None,
            listen_address: None,
            builds_dir: None,
            cache_dir: None,
            sentry_dsn: None,
            manage_repo: false,
            manage_docker: true,
            docker_images: Vec::new(),
            package_name: DEFAULT_PACKAGE_NAME.to_string(),
            package_ensure: "installed".to_string(),
            binary: DEFAULT_PACKAGE_NAME.to_string(),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            repo_base_url: DEFAULT_REPO_BASE_URL.to_string(),
            runner_defaults: RunnerOptions::new(),
            runners: BTreeMap::new(),
            host: HostSettings::default(),
        }
    }
}

/// A runner with its options fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerEntry {
    /// Key under `[runners]`; names the registration node.
    pub title: String,
    /// Name passed to the registration tool.
    pub name: String,
    pub ensure: Ensure,
    /// Merged options, `name` included, `ensure` removed.
    pub options: RunnerOptions,
}

/// Overlay `overrides` on top of `defaults`.
pub fn merge_options(defaults: &RunnerOptions, overrides: &RunnerOptions) -> RunnerOptions {
    let mut merged = defaults.clone();
    merged.extend(
        overrides
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    merged
}

impl Spec {
    pub fn validate(&self) -> Result<(), SpecError> {
        require_token("package_name", &self.package_name)?;
        require_token("binary", &self.binary)?;
        require_token("package_ensure", &self.package_ensure)?;
        if !self.config_path.is_absolute() {
            return Err(invalid_field("config_path", "must be an absolute path"));
        }
        if self.repo_base_url.trim().is_empty() {
            return Err(invalid_field("repo_base_url", "must not be empty"));
        }
        if self.host.command_timeout_secs == 0 {
            return Err(invalid_field("host.command_timeout_secs", "must be > 0"));
        }
        if self.host.output_limit_bytes == 0 {
            return Err(invalid_field("host.output_limit_bytes", "must be > 0"));
        }
        for image in &self.docker_images {
            require_token("docker_images", image)?;
        }
        self.resolve_runners()?;
        Ok(())
    }

    /// Resolve every declared runner in title order.
    pub fn resolve_runners(&self) -> Result<Vec<RunnerEntry>, SpecError> {
        let mut defaults = self.runner_defaults.clone();
        let default_ensure = match defaults.remove("ensure") {
            Some(toml::Value::String(raw)) => Some(raw),
            Some(_) => {
                return Err(SpecError::InvalidOption {
                    runner: "runner_defaults".to_string(),
                    option: "ensure".to_string(),
                    reason: "must be a string".to_string(),
                });
            }
            None => None,
        };

        let mut names: BTreeMap<String, String> = BTreeMap::new();
        let mut entries = Vec::with_capacity(self.runners.len());
        for (title, decl) in &self.runners {
            require_token("runner title", title)?;
            let raw_ensure = decl
                .ensure
                .as_deref()
                .or(default_ensure.as_deref())
                .unwrap_or("present");
            let ensure = Ensure::parse(title, raw_ensure)?;

            let mut options = merge_options(&defaults, &decl.options);
            options.remove("ensure");
            let name = match options.get("name") {
                None => title.clone(),
                Some(toml::Value::String(name)) if !name.trim().is_empty() => name.clone(),
                Some(_) => {
                    return Err(SpecError::InvalidOption {
                        runner: title.clone(),
                        option: "name".to_string(),
                        reason: "must be a non-empty string".to_string(),
                    });
                }
            };
            options.insert("name".to_string(), toml::Value::String(name.clone()));
            for (key, value) in &options {
                check_option_value(title, key, value)?;
            }

            if let Some(first) = names.insert(name.clone(), title.clone()) {
                return Err(SpecError::DuplicateRunnerName {
                    name,
                    first,
                    second: title.clone(),
                });
            }
            entries.push(RunnerEntry {
                title: title.clone(),
                name,
                ensure,
                options,
            });
        }
        Ok(entries)
    }
}

/// Options must flatten to `--key=value` flags.
fn check_option_value(runner: &str, key: &str, value: &toml::Value) -> Result<(), SpecError> {
    let invalid = |reason: &str| SpecError::InvalidOption {
        runner: runner.to_string(),
        option: key.to_string(),
        reason: reason.to_string(),
    };
    if key.is_empty() || key.contains(char::is_whitespace) || key.contains('=') {
        return Err(invalid("is not a valid flag name"));
    }
    match value {
        toml::Value::Table(_) => Err(invalid("cannot be a table")),
        toml::Value::Array(items) => {
            if items
                .iter()
                .any(|item| matches!(item, toml::Value::Table(_) | toml::Value::Array(_)))
            {
                return Err(invalid("arrays may only hold scalar values"));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn require_token(field: &str, value: &str) -> Result<(), SpecError> {
    if value.trim().is_empty() {
        return Err(invalid_field(field, "must not be empty"));
    }
    if value.contains(char::is_whitespace) {
        return Err(invalid_field(
            field,
            &format!("'{value}' must not contain whitespace"),
        ));
    }
    Ok(())
}

fn invalid_field(field: &str, reason: &str) -> SpecError {
    SpecError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> RunnerOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), toml::Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn parses_declared_toml() {
        let spec: Spec = toml::from_str(
            r#"
concurrent = 10
metrics_server = "localhost:9252"
manage_repo = true

[runner_defaults]
url = "https://git.example.com/ci"
registration-token = "1234567890abcdef"

[runners.test_runner]
ensure = "absent"
executor = "docker"
"#,
        )
        .expect("parse spec");
        spec.validate().expect("valid");

        assert_eq!(spec.concurrent, Some(10));
        assert!(spec.manage_repo);
        assert_eq!(spec.package_name, "gitlab-runner");
        let decl = &spec.runners["test_runner"];
        assert_eq!(decl.ensure.as_deref(), Some("absent"));
        assert_eq!(
            decl.options.get("executor"),
            Some(&toml::Value::String("docker".to_string()))
        );
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let err = toml::from_str::<Spec>("concurent = 10\n").unwrap_err();
        assert!(err.to_string().contains("concurent"));
    }

    #[test]
    fn entry_options_override_defaults() {
        let defaults = options(&[("url", "https://a"), ("executor", "shell")]);
        let overrides = options(&[("executor", "docker")]);
        let merged = merge_options(&defaults, &overrides);
        assert_eq!(merged, options(&[("url", "https://a"), ("executor", "docker")]));
    }

    #[test]
    fn resolve_defaults_name_to_title_and_strips_ensure() {
        let mut spec = Spec {
            runner_defaults: options(&[("url", "https://a"), ("ensure", "absent")]),
            ..Spec::default()
        };
        spec.runners
            .insert("test_runner".to_string(), RunnerDecl::default());

        let entries = spec.resolve_runners().expect("resolve");
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.name, "test_runner");
        assert_eq!(entry.ensure, Ensure::Absent);
        assert!(!entry.options.contains_key("ensure"));
        assert_eq!(
            entry.options.get("name"),
            Some(&toml::Value::String("test_runner".to_string()))
        );
    }

    #[test]
    fn unknown_ensure_is_a_validation_error() {
        let mut spec = Spec::default();
        spec.runners
            .insert("r".to_string(), RunnerDecl::with_ensure("running"));
        let err = spec.validate().unwrap_err();
        assert_eq!(
            err,
            SpecError::UnknownEnsure {
                runner: "r".to_string(),
                value: "running".to_string()
            }
        );
    }

    #[test]
    fn duplicate_resolved_names_are_rejected() {
        let mut spec = Spec::default();
        spec.runners.insert("a".to_string(), RunnerDecl::default());
        spec.runners.insert(
            "b".to_string(),
            RunnerDecl {
                ensure: None,
                options: options(&[("name", "a")]),
            },
        );
        let err = spec.resolve_runners().unwrap_err();
        assert!(matches!(err, SpecError::DuplicateRunnerName { .. }));
    }

    #[test]
    fn table_options_are_rejected() {
        let mut table = toml::map::Map::new();
        table.insert("x".to_string(), toml::Value::Integer(1));
        let mut spec = Spec::default();
        spec.runner_defaults
            .insert("docker".to_string(), toml::Value::Table(table));
        spec.runners.insert("r".to_string(), RunnerDecl::default());
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("cannot be a table"));
    }

    #[test]
    fn relative_config_path_is_rejected() {
        let spec = Spec {
            config_path: PathBuf::from("config.toml"),
            ..Spec::default()
        };
        assert!(spec.validate().is_err());
    }
}
