//! Error taxonomy for recipe resolution and build execution.
//!
//! Resolution-time errors (`MalformedRecipe`, `AmbiguousSource`,
//! `ToolchainRejected`, `ConfigConflict`, `ChecksumMismatch`) are raised
//! before any external process runs. `StepExecutionFailed` and
//! `VerificationFailed` are raised by the executor and the verification
//! stage respectively, so operators can tell "failed to build" apart from
//! "built but does not work".

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Result alias for the build pipeline.
pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Clone, PartialEq, Eq, Error, MietteDiagnostic)]
pub enum BuildError {
    #[error("malformed recipe: `{field}`: {cause}")]
    #[diagnostic(code(cellar::recipe::malformed))]
    MalformedRecipe { field: String, cause: String },

    #[error("ambiguous source: {count} `{channel}` sources declared")]
    #[diagnostic(code(cellar::recipe::ambiguous_source))]
    AmbiguousSource { channel: String, count: usize },

    #[error("checksum mismatch for `{artifact}`")]
    #[diagnostic(code(cellar::fetch::checksum_mismatch))]
    ChecksumMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("compiler `{compiler}` rejected: {reason}")]
    #[diagnostic(code(cellar::resolve::toolchain_rejected))]
    ToolchainRejected { compiler: String, reason: String },

    #[error("configuration conflict: {detail}")]
    #[diagnostic(code(cellar::resolve::config_conflict))]
    ConfigConflict { detail: String },

    #[error("step {index} `{step}` failed: {}", exit_label(.exit_status))]
    #[diagnostic(code(cellar::build::step_failed))]
    StepExecutionFailed {
        step: String,
        index: usize,
        exit_status: Option<i32>,
        diagnostic: String,
    },

    #[error("verification failed for variant `{variant}`: {}", exit_label(.exit_status))]
    #[diagnostic(code(cellar::verify::failed))]
    VerificationFailed {
        variant: String,
        command: String,
        exit_status: Option<i32>,
        diagnostic: String,
    },

    #[error("failed to fetch `{url}`: {cause}")]
    #[diagnostic(code(cellar::fetch::failed))]
    Fetch { url: String, cause: String },

    #[error("{context}: {cause}")]
    #[diagnostic(code(cellar::io))]
    Io { context: String, cause: String },
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "terminated without an exit status".to_string(),
    }
}

impl BuildError {
    pub fn malformed(field: impl Into<String>, cause: impl Into<String>) -> Self {
        BuildError::MalformedRecipe {
            field: field.into(),
            cause: cause.into(),
        }
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        BuildError::ConfigConflict {
            detail: detail.into(),
        }
    }

    /// Wrap a collaborator I/O failure.
    pub fn io(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        BuildError::Io {
            context: context.into(),
            cause: err.to_string(),
        }
    }

    /// Whether the error is raised before any external process runs.
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            BuildError::MalformedRecipe { .. }
                | BuildError::AmbiguousSource { .. }
                | BuildError::ChecksumMismatch { .. }
                | BuildError::ToolchainRejected { .. }
                | BuildError::ConfigConflict { .. }
                | BuildError::Fetch { .. }
        )
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BuildError::MalformedRecipe { .. } => "malformed-recipe",
            BuildError::AmbiguousSource { .. } => "ambiguous-source",
            BuildError::ChecksumMismatch { .. } => "checksum-mismatch",
            BuildError::ToolchainRejected { .. } => "toolchain-rejected",
            BuildError::ConfigConflict { .. } => "config-conflict",
            BuildError::StepExecutionFailed { .. } => "step-execution-failed",
            BuildError::VerificationFailed { .. } => "verification-failed",
            BuildError::Fetch { .. } => "fetch-failed",
            BuildError::Io { .. } => "io",
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string());
        match self {
            BuildError::MalformedRecipe { .. } => {
                diag.with_suggestion("Fix the recipe field named above; nothing was built")
            }
            BuildError::AmbiguousSource { channel, .. } => diag
                .with_context(format!(
                    "a recipe may declare at most one `{}` source",
                    channel
                ))
                .with_suggestion("Remove the extra source or move it to the other channel"),
            BuildError::ChecksumMismatch {
                expected, actual, ..
            } => diag
                .with_context(format!("expected sha256 {}", expected))
                .with_context(format!("actual sha256   {}", actual))
                .with_suggestion(suggestions::CHECKSUM_MISMATCH),
            BuildError::ToolchainRejected { .. } => diag
                .with_context("no build step was executed")
                .with_suggestion("Select a different compiler with `toolchain.cc`/`toolchain.cxx`"),
            BuildError::ConfigConflict { .. } => diag
                .with_context("no build step was executed")
                .with_suggestion(suggestions::LIST_OPTIONS),
            BuildError::StepExecutionFailed { diagnostic, .. } => {
                let diag = diag.with_context(
                    "later steps were not run; completed steps were left in place",
                );
                let diag = if diagnostic.is_empty() {
                    diag
                } else {
                    diag.with_context(diagnostic.clone())
                };
                diag.with_suggestion(suggestions::BUILD_FAILED)
            }
            BuildError::VerificationFailed {
                command,
                diagnostic,
                ..
            } => {
                let diag = diag
                    .with_context("every build step succeeded; the installed package failed its smoke test")
                    .with_context(format!("command: {}", command));
                if diagnostic.is_empty() {
                    diag
                } else {
                    diag.with_context(diagnostic.clone())
                }
            }
            BuildError::Fetch { .. } => diag.with_suggestion(suggestions::FETCH_FAILED),
            BuildError::Io { .. } => diag,
        }
    }
}
