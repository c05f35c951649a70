//! Deterministic, pure logic for catalog construction and convergence.
//!
//! Core modules must be free of I/O side effects. Host interaction happens
//! only through the [`converge::Provider`] trait.

pub mod catalog;
pub mod converge;
pub mod error;
pub mod fragment;
pub mod graph;
pub mod platform;
pub mod registration;
pub mod resource;
pub mod spec;
pub mod types;
