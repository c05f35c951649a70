//! Converge a host onto a declared CI runner state.
//!
//! Reads a TOML spec, builds the resource catalog for the host platform and
//! either prints it (`plan`) or applies it (`apply`). Exit codes follow
//! [`ci_runner_converge::exit_codes`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use ci_runner_converge::core::converge::ConvergeOptions;
use ci_runner_converge::core::platform::{OsFamily, Platform};
use ci_runner_converge::io::config::load_spec;
use ci_runner_converge::io::facts::{OS_RELEASE_PATH, detect_platform};
use ci_runner_converge::{apply, exit_codes, logging, plan};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "ci-runner-converge",
    version,
    about = "Converge a host onto a declared CI runner state"
)]
struct Cli {
    /// Path to the TOML spec.
    #[arg(long, global = true, default_value = "runner.toml")]
    spec: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse the spec and build its catalog without touching the host.
    Validate {
        #[command(flatten)]
        platform: PlatformArgs,
    },
    /// Print nodes in application order with their edges.
    Plan {
        #[command(flatten)]
        platform: PlatformArgs,
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Converge the host.
    Apply {
        #[command(flatten)]
        platform: PlatformArgs,
        /// Report what would change without changing anything.
        #[arg(long)]
        noop: bool,
        /// Emit the report as JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
struct PlatformArgs {
    /// Override the detected os family (`debian`, `redhat`, or any other id).
    #[arg(long)]
    os_family: Option<String>,
    /// Distribution id used in apt locations; defaults per family.
    #[arg(long, requires = "os_family")]
    distro_id: Option<String>,
    /// Release codename, e.g. `bookworm`.
    #[arg(long)]
    codename: Option<String>,
    /// os-release file read when no family is given.
    #[arg(long, default_value = OS_RELEASE_PATH)]
    os_release: PathBuf,
}

impl PlatformArgs {
    fn resolve(&self) -> Result<Platform> {
        let Some(family) = &self.os_family else {
            let mut platform = detect_platform(&self.os_release)
                .context("detect platform (pass --os-family to skip detection)")?;
            if self.codename.is_some() {
                platform.codename.clone_from(&self.codename);
            }
            return Ok(platform);
        };
        let family = parse_family(family);
        let distro_id = self.distro_id.clone().unwrap_or_else(|| match &family {
            OsFamily::Debian => "debian".to_string(),
            OsFamily::RedHat => "centos".to_string(),
            OsFamily::Other(id) => id.clone(),
        });
        Ok(Platform {
            family,
            distro_id,
            codename: self.codename.clone(),
        })
    }
}

fn parse_family(raw: &str) -> OsFamily {
    match raw.to_ascii_lowercase().as_str() {
        "debian" => OsFamily::Debian,
        "redhat" => OsFamily::RedHat,
        other => OsFamily::Other(other.to_string()),
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let spec = load_spec(&cli.spec)?;
    match cli.command {
        Command::Validate { platform } => {
            let platform = platform.resolve()?;
            let plan = plan::plan(&spec, &platform)?;
            println!("ok: {} nodes", plan.nodes.len());
            Ok(exit_codes::OK)
        }
        Command::Plan { platform, json } => {
            let platform = platform.resolve()?;
            let plan = plan::plan(&spec, &platform)?;
            if json {
                print_json(&plan)?;
            } else {
                print!("{}", plan.render());
            }
            Ok(exit_codes::OK)
        }
        Command::Apply {
            platform,
            noop,
            json,
        } => {
            let platform = platform.resolve()?;
            let report = apply::apply(&spec, &platform, &ConvergeOptions { noop })?;
            if json {
                print_json(&report)?;
            } else {
                print!("{}", report.render());
            }
            Ok(exit_codes::for_report(&report))
        }
    }
}

/// Print `value` as pretty JSON with a trailing newline.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
