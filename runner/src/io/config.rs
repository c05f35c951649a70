//! Declared runner state, loaded from a TOML spec file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::spec::Spec;

/// Parse a spec from TOML text and validate it.
pub fn parse_spec(contents: &str) -> Result<Spec> {
    let spec: Spec = toml::from_str(contents).context("parse spec toml")?;
    spec.validate()?;
    Ok(spec)
}

/// Load and validate the spec at `path`.
///
/// A missing file is an error; there is no implicit empty spec.
pub fn load_spec(path: &Path) -> Result<Spec> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_spec(&contents).with_context(|| format!("invalid spec {}", path.display()))
}
