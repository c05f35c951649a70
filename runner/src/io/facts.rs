//! Host fact discovery.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::platform::Platform;

pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Read platform facts from an `os-release` file.
pub fn detect_platform(os_release: &Path) -> Result<Platform> {
    let contents = fs::read_to_string(os_release)
        .with_context(|| format!("read {}", os_release.display()))?;
    let platform = Platform::from_os_release(&contents);
    debug!(
        family = platform.family.as_str(),
        distro = %platform.distro_id,
        codename = ?platform.codename,
        "detected platform"
    );
    Ok(platform)
}
