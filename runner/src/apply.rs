//! `apply` command: converge the host onto the catalog.

use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::catalog::build_catalog;
use crate::core::converge::{ConvergeOptions, converge};
use crate::core::platform::Platform;
use crate::core::spec::Spec;
use crate::core::types::ConvergeReport;
use crate::io::packages;
use crate::io::process::SystemProcessRunner;
use crate::io::provider::HostProvider;
use crate::io::services::SystemdServiceManager;

/// Build the catalog and run one pass against the real host.
#[instrument(skip_all, fields(family = platform.family.as_str(), noop = options.noop))]
pub fn apply(spec: &Spec, platform: &Platform, options: &ConvergeOptions) -> Result<ConvergeReport> {
    let catalog = build_catalog(spec, platform)?;
    info!(nodes = catalog.graph().len(), "catalog built");

    let process = SystemProcessRunner {
        timeout: Duration::from_secs(spec.host.command_timeout_secs),
        output_limit_bytes: spec.host.output_limit_bytes,
    };
    let packages = packages::for_family(&platform.family, &process);
    let services = SystemdServiceManager::new(&process);
    let provider = HostProvider {
        packages: packages.as_ref(),
        services: &services,
        process: &process,
        settings: &spec.host,
    };

    let report = converge(&catalog, &provider, options);
    info!(status = ?report.status(), "pass finished");
    Ok(report)
}
