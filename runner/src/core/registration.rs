//! Command lines for the runner registration tool.

use crate::core::spec::{Ensure, RunnerEntry};

pub const BIN_DIR: &str = "/usr/bin";

/// Absolute path of the registration binary.
pub fn binary_path(binary: &str) -> String {
    format!("{BIN_DIR}/{binary}")
}

/// Title of the command node that reconciles `entry`.
pub fn node_title(entry: &RunnerEntry) -> String {
    match entry.ensure {
        Ensure::Present => format!("Register_runner_{}", entry.title),
        Ensure::Absent => format!("Unregister_runner_{}", entry.title),
    }
}

/// Argument vector for `entry`'s register or unregister call.
///
/// The ensure state only selects the verb; it is never forwarded.
pub fn argv(binary: &str, entry: &RunnerEntry) -> Vec<String> {
    let mut argv = vec![binary_path(binary)];
    match entry.ensure {
        Ensure::Present => {
            argv.push("register".to_string());
            argv.push("--non-interactive".to_string());
            for (key, value) in entry.options.iter().filter(|(key, _)| *key != "ensure") {
                push_flags(&mut argv, key, value);
            }
        }
        Ensure::Absent => {
            argv.push("unregister".to_string());
            argv.push(format!("--name={}", entry.name));
        }
    }
    argv
}

/// `<binary> restart`, run when registrations change.
pub fn restart_argv(binary: &str) -> Vec<String> {
    vec![binary_path(binary), "restart".to_string()]
}

fn push_flags(argv: &mut Vec<String>, key: &str, value: &toml::Value) {
    match value {
        toml::Value::Array(items) => {
            for item in items {
                push_flags(argv, key, item);
            }
        }
        scalar => argv.push(format!("--{key}={}", scalar_text(scalar))),
    }
}

fn scalar_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(text) => text.clone(),
        toml::Value::Integer(number) => number.to_string(),
        toml::Value::Float(number) => number.to_string(),
        toml::Value::Boolean(flag) => flag.to_string(),
        toml::Value::Datetime(datetime) => datetime.to_string(),
        // Rejected during spec validation.
        toml::Value::Array(_) | toml::Value::Table(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spec::RunnerOptions;

    fn entry(ensure: Ensure, extra: &[(&str, toml::Value)]) -> RunnerEntry {
        let mut options = RunnerOptions::new();
        options.insert(
            "name".to_string(),
            toml::Value::String("test_runner".to_string()),
        );
        for (key, value) in extra {
            options.insert(key.to_string(), value.clone());
        }
        RunnerEntry {
            title: "test_runner".to_string(),
            name: "test_runner".to_string(),
            ensure,
            options,
        }
    }

    #[test]
    fn register_renders_sorted_flags() {
        let entry = entry(
            Ensure::Present,
            &[
                ("url", toml::Value::String("https://git.example.com/ci".into())),
                ("executor", toml::Value::String("docker".into())),
                ("run-untagged", toml::Value::Boolean(true)),
            ],
        );
        assert_eq!(
            argv("gitlab-runner", &entry).join(" "),
            "/usr/bin/gitlab-runner register --non-interactive --executor=docker \
             --name=test_runner --run-untagged=true --url=https://git.example.com/ci"
        );
        assert_eq!(node_title(&entry), "Register_runner_test_runner");
    }

    #[test]
    fn array_options_repeat_the_flag() {
        let tags = toml::Value::Array(vec![
            toml::Value::String("linux".into()),
            toml::Value::String("docker".into()),
        ]);
        let argv = argv("gitlab-runner", &entry(Ensure::Present, &[("tag-list", tags)]));
        assert!(argv.contains(&"--tag-list=linux".to_string()));
        assert!(argv.contains(&"--tag-list=docker".to_string()));
    }

    #[test]
    fn ensure_never_reaches_the_tool() {
        let present = entry(
            Ensure::Present,
            &[("ensure", toml::Value::String("present".into()))],
        );
        let line = argv("gitlab-runner", &present).join(" ");
        assert!(!line.contains("--ensure="));

        let absent = entry(Ensure::Absent, &[]);
        let line = argv("gitlab-runner", &absent).join(" ");
        assert_eq!(line, "/usr/bin/gitlab-runner unregister --name=test_runner");
        assert_eq!(node_title(&absent), "Unregister_runner_test_runner");
    }
}
