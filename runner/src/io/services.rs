//! Service manager collaborator backed by `systemctl`.

use anyhow::Result;
use tracing::{info, instrument};

use crate::io::process::{ProcessRunner, run_checked};

pub trait ServiceManager {
    fn is_running(&self, name: &str) -> Result<bool>;
    fn is_enabled(&self, name: &str) -> Result<bool>;
    fn start(&self, name: &str) -> Result<()>;
    fn enable(&self, name: &str) -> Result<()>;
    fn restart(&self, name: &str) -> Result<()>;
}

pub struct SystemdServiceManager<'a> {
    process: &'a dyn ProcessRunner,
}

impl<'a> SystemdServiceManager<'a> {
    pub fn new(process: &'a dyn ProcessRunner) -> Self {
        Self { process }
    }

    fn query(&self, verb: &str, name: &str) -> Result<bool> {
        let output = self.process.run(&systemctl(&[verb, "--quiet", name]))?;
        Ok(output.success())
    }

    fn change(&self, verb: &str, name: &str) -> Result<()> {
        info!(service = name, verb, "systemctl");
        run_checked(self.process, &systemctl(&[verb, name]))?;
        Ok(())
    }
}

impl ServiceManager for SystemdServiceManager<'_> {
    #[instrument(skip(self))]
    fn is_running(&self, name: &str) -> Result<bool> {
        self.query("is-active", name)
    }

    #[instrument(skip(self))]
    fn is_enabled(&self, name: &str) -> Result<bool> {
        self.query("is-enabled", name)
    }

    fn start(&self, name: &str) -> Result<()> {
        self.change("start", name)
    }

    fn enable(&self, name: &str) -> Result<()> {
        self.change("enable", name)
    }

    fn restart(&self, name: &str) -> Result<()> {
        self.change("restart", name)
    }
}

fn systemctl(args: &[&str]) -> Vec<String> {
    std::iter::once("systemctl")
        .chain(args.iter().copied())
        .map(str::to_string)
        .collect()
}
