//! Core data structures for Cellar.
//!
//! This module contains the foundational types used throughout Cellar:
//! - Recipes and their condition language
//! - Requested build options
//! - Host facts (OS, compiler, installed dependencies)
//! - The error taxonomy shared by every stage

pub mod errors;
pub mod host;
pub mod options;
pub mod predicate;
pub mod recipe;
pub mod template;
pub mod version;

pub use errors::{BuildError, BuildResult};
pub use host::{HostFacts, HostFactsProvider};
pub use options::BuildOptions;
pub use predicate::Predicate;
pub use recipe::Recipe;
pub use version::DottedVersion;
