//! Rendering of package repository definitions to their on-disk files.

use std::path::PathBuf;

use anyhow::{Context, Result};
use minijinja::Environment;

use crate::core::platform::RepoDescriptor;
use crate::core::spec::HostSettings;

const APT_TEMPLATE: &str = include_str!("templates/apt_source.list.j2");
const YUM_TEMPLATE: &str = include_str!("templates/yum.repo.j2");

fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template("apt_source", APT_TEMPLATE)
        .context("load apt source template")?;
    env.add_template("yum_repo", YUM_TEMPLATE)
        .context("load yum repo template")?;
    Ok(env)
}

/// Where `descriptor` lives on the host; `None` for unsupported families.
pub fn repo_file_path(descriptor: &RepoDescriptor, settings: &HostSettings) -> Option<PathBuf> {
    match descriptor {
        RepoDescriptor::Apt(source) => Some(
            settings
                .apt_sources_dir
                .join(format!("{}.list", source.name)),
        ),
        RepoDescriptor::Yum(repo) => Some(settings.yum_repos_dir.join(format!("{}.repo", repo.name))),
        RepoDescriptor::Unsupported { .. } => None,
    }
}

/// Expected file contents for `descriptor`, newline terminated.
pub fn render_repo_file(descriptor: &RepoDescriptor) -> Result<Option<String>> {
    let env = environment()?;
    let rendered = match descriptor {
        RepoDescriptor::Apt(source) => env
            .get_template("apt_source")?
            .render(source)
            .with_context(|| format!("render apt source {}", source.name))?,
        RepoDescriptor::Yum(repo) => env
            .get_template("yum_repo")?
            .render(repo)
            .with_context(|| format!("render yum repo {}", repo.name))?,
        RepoDescriptor::Unsupported { .. } => return Ok(None),
    };
    let mut out = rendered.trim_end().to_string();
    out.push('\n');
    Ok(Some(out))
}
