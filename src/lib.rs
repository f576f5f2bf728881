//! Cellar - a declarative build-recipe resolver and executor
//!
//! A recipe describes how to fetch, patch, configure, compile, install and
//! smoke-test one third-party source package. This crate provides the core
//! library functionality for Cellar: recipe parsing, option and constraint
//! resolution, build planning, and execution.

pub mod builder;
pub mod core;
pub mod ops;
pub mod resolver;
pub mod sources;
pub mod util;

/// Test utilities and mocks for cellar unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides mock implementations for process execution,
/// artifact fetching and host detection.
#[cfg(test)]
pub mod test_support;

pub use core::{BuildError, BuildOptions, BuildResult, HostFacts, Recipe};
pub use resolver::{resolve, ResolvedConfig};
pub use util::context::GlobalContext;
