//! Declarative convergence of a host onto a desired CI runner state.
//!
//! A TOML spec declares the runner package, global configuration lines and
//! runner registrations. The crate turns it into a dependency graph of
//! resources and walks that graph once, checking each resource and applying
//! it only when the host diverges. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (spec resolution, catalog
//!   construction, ordering, the convergence walk). No I/O.
//! - **[`io`]**: Side-effecting collaborators (processes, packages, services,
//!   files). Each sits behind a trait so tests can script it.
//!
//! Orchestration modules ([`plan`], [`apply`]) wire the two together for the
//! CLI commands.

pub mod apply;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod plan;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
