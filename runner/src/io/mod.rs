//! Host collaborators and I/O helpers.

pub mod config;
pub mod facts;
pub mod files;
pub mod packages;
pub mod process;
pub mod provider;
pub mod repo_files;
pub mod services;
