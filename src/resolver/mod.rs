//! Option and constraint resolution.
//!
//! The resolver is pure and deterministic: it reads a recipe, the requested
//! options and a host facts snapshot, and never touches the filesystem or
//! spawns a process. All I/O happens before (host detection) or after
//! (fetching and building).

pub mod resolve;
pub mod toolchain;

pub use resolve::{
    resolve, ResolvedConfig, ResolvedDependency, ResolvedPatch, ResolvedTest, ResolvedVariant,
};
pub use toolchain::ToolchainDecision;
