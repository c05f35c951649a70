//! Package manager collaborator.

use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::core::error::ApplyError;
use crate::core::platform::OsFamily;
use crate::io::process::{ProcessRunner, run_checked};

pub trait PackageManager {
    /// Installed version of `name`, or `None` when absent.
    fn installed_version(&self, name: &str) -> Result<Option<String>>;
    /// Install `name`, pinned to `version` when given.
    fn install(&self, name: &str, version: Option<&str>) -> Result<()>;
}

/// dpkg/apt-get backed manager for Debian-family hosts.
pub struct AptPackageManager<'a> {
    process: &'a dyn ProcessRunner,
}

impl<'a> AptPackageManager<'a> {
    pub fn new(process: &'a dyn ProcessRunner) -> Self {
        Self { process }
    }
}

impl PackageManager for AptPackageManager<'_> {
    #[instrument(skip(self))]
    fn installed_version(&self, name: &str) -> Result<Option<String>> {
        let output = self.process.run(&argv(&[
            "dpkg-query",
            "-W",
            "-f=${Status}\t${Version}",
            name,
        ]))?;
        if !output.success() {
            return Ok(None);
        }
        // `install ok installed\t16.11.1`
        let version = output
            .stdout
            .split_once('\t')
            .filter(|(status, _)| status.ends_with(" installed"))
            .map(|(_, version)| version.trim().to_string())
            .filter(|version| !version.is_empty());
        debug!(?version, "queried dpkg");
        Ok(version)
    }

    #[instrument(skip(self))]
    fn install(&self, name: &str, version: Option<&str>) -> Result<()> {
        let target = match version {
            Some(version) => format!("{name}={version}"),
            None => name.to_string(),
        };
        info!(package = %target, "installing with apt-get");
        run_checked(
            self.process,
            &argv(&["apt-get", "install", "-y", "-q", &target]),
        )?;
        Ok(())
    }
}

/// rpm/yum backed manager for RedHat-family hosts.
pub struct YumPackageManager<'a> {
    process: &'a dyn ProcessRunner,
}

impl<'a> YumPackageManager<'a> {
    pub fn new(process: &'a dyn ProcessRunner) -> Self {
        Self { process }
    }
}

impl PackageManager for YumPackageManager<'_> {
    #[instrument(skip(self))]
    fn installed_version(&self, name: &str) -> Result<Option<String>> {
        let output = self.process.run(&argv(&[
            "rpm",
            "-q",
            "--queryformat",
            "%{VERSION}-%{RELEASE}",
            name,
        ]))?;
        if !output.success() {
            return Ok(None);
        }
        let version = output.stdout.trim().to_string();
        debug!(%version, "queried rpm");
        Ok(Some(version).filter(|v| !v.is_empty()))
    }

    #[instrument(skip(self))]
    fn install(&self, name: &str, version: Option<&str>) -> Result<()> {
        let target = match version {
            Some(version) => format!("{name}-{version}"),
            None => name.to_string(),
        };
        info!(package = %target, "installing with yum");
        run_checked(self.process, &argv(&["yum", "install", "-y", &target]))?;
        Ok(())
    }
}

/// Stand-in for families without a known package manager.
pub struct UnsupportedPackageManager {
    pub family: String,
}

impl UnsupportedPackageManager {
    fn unavailable(&self) -> anyhow::Error {
        ApplyError::CollaboratorUnavailable {
            capability: "package manager".to_string(),
            family: self.family.clone(),
        }
        .into()
    }
}

impl PackageManager for UnsupportedPackageManager {
    fn installed_version(&self, _name: &str) -> Result<Option<String>> {
        Err(self.unavailable())
    }

    fn install(&self, _name: &str, _version: Option<&str>) -> Result<()> {
        Err(self.unavailable())
    }
}

/// Package manager for `family`.
pub fn for_family<'a>(
    family: &OsFamily,
    process: &'a dyn ProcessRunner,
) -> Box<dyn PackageManager + 'a> {
    match family {
        OsFamily::Debian => Box::new(AptPackageManager::new(process)),
        OsFamily::RedHat => Box::new(YumPackageManager::new(process)),
        OsFamily::Other(family) => Box::new(UnsupportedPackageManager {
            family: family.clone(),
        }),
    }
}

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}
