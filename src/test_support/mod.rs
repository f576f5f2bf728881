//! Test utilities and mocks for cellar unit tests.
//!
//! This module provides mock implementations for the interfaces that touch
//! the outside world: running processes, fetching artifacts and probing
//! the host.
//!
//! # Example
//!
//! ```rust,ignore
//! use cellar::test_support::{CommandPattern, MockRunner};
//!
//! #[test]
//! fn test_example() {
//!     let runner = MockRunner::new()
//!         .fail_on(CommandPattern::StartsWith("make".into()), 2, "error: boost");
//!
//!     // Hand `&runner` to a BuildExecutor...
//!     assert!(runner.calls().is_empty());
//! }
//! ```

pub mod fixtures;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Result};

use crate::builder::command::CommandSpec;
use crate::builder::executor::{CommandOutput, CommandRunner};
use crate::core::errors::{BuildError, BuildResult};
use crate::core::host::{HostFacts, HostFactsProvider};
use crate::sources::Fetcher;

/// Pattern for matching commands in MockRunner.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    /// Match if command starts with prefix.
    StartsWith(String),
    /// Match if command contains substring.
    Contains(String),
    /// Match using a regex pattern.
    Regex(String),
    /// Match any command.
    Any,
}

impl CommandPattern {
    /// Check if this pattern matches the given command.
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
            CommandPattern::Contains(s) => cmd.contains(s),
            CommandPattern::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(cmd))
                .unwrap_or(false),
            CommandPattern::Any => true,
        }
    }
}

#[derive(Debug, Clone)]
enum MockResponse {
    Output(CommandOutput),
    SpawnError,
}

/// Mock command runner.
///
/// Records every command line it is asked to run. Commands succeed with
/// empty output unless a registered pattern says otherwise; the first
/// matching pattern wins.
#[derive(Debug, Default)]
pub struct MockRunner {
    responses: Vec<(CommandPattern, MockResponse)>,
    calls: Mutex<Vec<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        MockRunner::default()
    }

    /// Exit with `status` and `stderr` for matching commands.
    pub fn fail_on(mut self, pattern: CommandPattern, status: i32, stderr: &str) -> Self {
        self.responses.push((
            pattern,
            MockResponse::Output(CommandOutput {
                exit_status: Some(status),
                stdout: Vec::new(),
                stderr: stderr.as_bytes().to_vec(),
            }),
        ));
        self
    }

    /// Report a signal death (no exit status) for matching commands.
    pub fn kill_on(mut self, pattern: CommandPattern) -> Self {
        self.responses.push((
            pattern,
            MockResponse::Output(CommandOutput {
                exit_status: None,
                ..CommandOutput::default()
            }),
        ));
        self
    }

    /// Fail to start matching commands.
    pub fn unspawnable(mut self, pattern: CommandPattern) -> Self {
        self.responses.push((pattern, MockResponse::SpawnError));
        self
    }

    /// All command lines run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Whether any recorded command matches.
    pub fn ran(&self, pattern: &CommandPattern) -> bool {
        self.calls().iter().any(|c| pattern.matches(c))
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        let line = cmd.display();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line.clone());
        }

        match self.responses.iter().find(|(p, _)| p.matches(&line)) {
            Some((_, MockResponse::Output(output))) => Ok(output.clone()),
            Some((_, MockResponse::SpawnError)) => {
                bail!("failed to spawn `{}`", cmd.program.display())
            }
            None => Ok(CommandOutput {
                exit_status: Some(0),
                ..CommandOutput::default()
            }),
        }
    }
}

/// Fetcher serving artifacts from a fixed URL table without verification.
#[derive(Debug, Default)]
pub struct MockFetcher {
    artifacts: BTreeMap<String, PathBuf>,
    requests: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        MockFetcher::default()
    }

    pub fn with_artifact(mut self, url: &str, path: impl Into<PathBuf>) -> Self {
        self.artifacts.insert(url.to_string(), path.into());
        self
    }

    /// Every URL requested so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &str, _sha256: &str) -> BuildResult<PathBuf> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        self.artifacts
            .get(url)
            .cloned()
            .ok_or_else(|| BuildError::Fetch {
                url: url.to_string(),
                cause: "no such mock artifact".to_string(),
            })
    }
}

/// Host provider returning a fixed snapshot.
#[derive(Debug, Clone)]
pub struct MockHost(pub HostFacts);

impl HostFactsProvider for MockHost {
    fn host_facts(&self) -> Result<HostFacts> {
        Ok(self.0.clone())
    }
}

/// Assertion helpers for testing.
pub mod assertions {
    use crate::core::errors::BuildError;

    /// Assert that a result failed with the given error kind.
    pub fn assert_kind<T: std::fmt::Debug>(result: Result<T, BuildError>, kind: &str) -> BuildError {
        match result {
            Ok(v) => panic!("expected `{}` error, got Ok({:?})", kind, v),
            Err(e) => {
                assert_eq!(e.kind(), kind, "unexpected error: {}", e);
                e
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_pattern() {
        assert!(CommandPattern::Exact("make install".into()).matches("make install"));
        assert!(CommandPattern::StartsWith("./configure".into()).matches("./configure --prefix=/x"));
        assert!(CommandPattern::Contains("install".into()).matches("make install"));
        assert!(CommandPattern::Regex(r"^make -j\d+$".into()).matches("make -j8"));
        assert!(CommandPattern::Any.matches("anything"));
    }

    #[test]
    fn test_mock_runner_records_calls() {
        let runner = MockRunner::new().fail_on(CommandPattern::Contains("check".into()), 2, "boom");
        let ok = runner.run(&CommandSpec::new("make", "/w")).unwrap();
        let bad = runner.run(&CommandSpec::new("make", "/w").arg("check")).unwrap();

        assert!(ok.success());
        assert_eq!(bad.exit_status, Some(2));
        assert_eq!(runner.calls(), vec!["make", "make check"]);
    }
}
