//! High-level operations.
//!
//! This module contains the implementation of cellar commands.

pub mod cellar_build;
pub mod verify;

pub use cellar_build::{
    build, layout_for, plan_request, resolve_request, test_installed, BuildOutcome, BuildRequest,
    Collaborators,
};
pub use verify::{verify, verify_variant, VerifyResult};
