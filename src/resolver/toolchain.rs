//! Compiler acceptance.
//!
//! Decides whether the host compiler may build a recipe, from the recipe's
//! ordered toolchain constraints and its compiler feature requirements.

use serde::Serialize;

use crate::core::errors::{BuildError, BuildResult};
use crate::core::host::{CompilerFacts, CompilerFamily};
use crate::core::predicate::EvalContext;
use crate::core::recipe::{ConstraintAction, Recipe, ToolchainConstraint};

/// Outcome of toolchain evaluation for an accepted compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainDecision {
    pub family: CompilerFamily,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<u64>,
    /// The accept rule that decided, if any rule matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_by: Option<String>,
    /// Compiler features the build relies on
    pub required_features: Vec<String>,
}

impl ToolchainDecision {
    pub fn label(&self) -> String {
        match self.build {
            Some(b) => format!("{} {} (build {})", self.family, self.version, b),
            None => format!("{} {}", self.family, self.version),
        }
    }
}

fn matches(rule: &ToolchainConstraint, compiler: &CompilerFacts, ctx: &EvalContext<'_>) -> bool {
    if rule.compiler != compiler.family {
        return false;
    }
    if let Some(ref series) = rule.version {
        if !compiler.version.starts_with(series) {
            return false;
        }
    }
    if let Some(max_build) = rule.build {
        // Vendor build bounds only apply to compilers that report a build.
        match compiler.build {
            Some(b) if b <= max_build => {}
            _ => return false,
        }
    }
    rule.when.as_ref().is_none_or(|w| w.eval(ctx))
}

/// Evaluate toolchain constraints and requirements against the host compiler.
///
/// # Algorithm
///
/// 1. Check every constraint. Any matching `reject` rule fails with
///    `ToolchainRejected`, whatever `accept` rules also match. The first
///    matching `accept` rule is recorded in `accepted_by`.
///
/// 2. Every requirement whose condition holds names a compiler feature; a
///    compiler lacking it fails with `ToolchainRejected`.
pub fn decide(recipe: &Recipe, ctx: &EvalContext<'_>) -> BuildResult<ToolchainDecision> {
    let compiler = &ctx.host.compiler;
    let mut accepted_by = None;

    for rule in recipe.toolchain.iter().filter(|rule| matches(rule, compiler, ctx)) {
        match rule.action {
            ConstraintAction::Reject => {
                let reason = match rule.cause {
                    Some(ref cause) => format!("{} (matched `{}`)", cause, rule.describe()),
                    None => format!("{} cannot build {}", rule.describe(), recipe.name),
                };
                tracing::debug!("compiler {} rejected by `{}`", compiler.label(), rule.describe());
                return Err(BuildError::ToolchainRejected {
                    compiler: compiler.label(),
                    reason,
                });
            }
            ConstraintAction::Accept => {
                if accepted_by.is_none() {
                    accepted_by = Some(rule.describe());
                }
            }
        }
    }

    let mut required_features = Vec::new();
    for req in &recipe.requirements {
        if !req.when.as_ref().is_none_or(|w| w.eval(ctx)) {
            continue;
        }
        if !compiler.has_feature(&req.needs) {
            return Err(BuildError::ToolchainRejected {
                compiler: compiler.label(),
                reason: format!("compiler does not support `{}`", req.needs),
            });
        }
        if !required_features.contains(&req.needs) {
            required_features.push(req.needs.clone());
        }
    }

    Ok(ToolchainDecision {
        family: compiler.family,
        version: compiler.version.to_string(),
        build: compiler.build,
        accepted_by,
        required_features,
    })
}
