//! User-facing diagnostic messages.
//!
//! Every error shown to an operator carries the root cause, the conflicting
//! facts that produced it, and a suggested fix where one exists.

use std::fmt;
use std::path::PathBuf;

/// Common suggestion messages.
pub mod suggestions {
    /// Suggestion when a build step fails.
    pub const BUILD_FAILED: &str = "Re-run with `cellar build --verbose` for the full command output";

    /// Suggestion when a checksum does not match.
    pub const CHECKSUM_MISMATCH: &str =
        "Check that the recipe's sha256 matches the upstream artifact, then clear the cache entry";

    /// Suggestion for fetch failures.
    pub const FETCH_FAILED: &str = "Check your network connection, or disable `net.offline`";

    /// Suggestion when an option is not declared by the recipe.
    pub const LIST_OPTIONS: &str = "Run `cellar info <recipe>` to list the declared options";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic message with optional context and suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related file
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(message)
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = match (color, self.severity) {
            (true, Severity::Error) => "\x1b[1;31merror\x1b[0m",
            (true, Severity::Warning) => "\x1b[1;33mwarning\x1b[0m",
            (false, Severity::Error) => "error",
            (false, Severity::Warning) => "warning",
        };

        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            for (i, line) in ctx.lines().enumerate() {
                let marker = if i == 0 { "=" } else { " " };
                output.push_str(&format!("  {} {}\n", marker, line));
            }
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("compiler `gcc 4.8.5` rejected by recipe `graph-tool`")
            .with_context("We need GCC 5.0 or above for sufficient c++14 support")
            .with_suggestion("Install GCC 5 or newer and set `toolchain.cc`");

        let output = diag.format(false);
        assert!(output.contains("error: compiler `gcc 4.8.5` rejected"));
        assert!(output.contains("= We need GCC 5.0"));
        assert!(output.contains("help: consider:"));
        assert!(output.contains("1. Install GCC 5"));
    }

    #[test]
    fn test_multiline_context_is_indented() {
        let diag = Diagnostic::warning("step output").with_context("line one\nline two");
        let output = diag.format(false);
        assert!(output.starts_with("warning: step output"));
        assert!(output.contains("  = line one\n    line two\n"));
    }

    #[test]
    fn test_location() {
        let diag = Diagnostic::error("bad recipe").with_location("recipes/graph-tool.toml");
        assert!(diag.to_string().contains("--> recipes/graph-tool.toml"));
    }
}
