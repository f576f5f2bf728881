//! Opaque process invocations handed to a command runner.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::util::process::ProcessBuilder;

/// A fully rendered command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    /// The program to run (e.g., "./configure", "make")
    pub program: PathBuf,
    /// Command arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Environment variables set on top of the inherited environment
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    /// Build from an argv whose first element is the program.
    pub fn from_argv(argv: &[String], cwd: impl Into<PathBuf>) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(CommandSpec::new(program, cwd).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// The command line as a single display string.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|a| {
            if a.contains(char::is_whitespace) {
                format!("'{}'", a)
            } else {
                a.clone()
            }
        }));
        parts.join(" ")
    }

    pub fn to_process(&self) -> ProcessBuilder {
        ProcessBuilder::new(&self.program)
            .args(&self.args)
            .envs(&self.env)
            .cwd(&self.cwd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_argv() {
        let argv = vec!["make".to_string(), "install".to_string()];
        let cmd = CommandSpec::from_argv(&argv, "/work/src").unwrap();
        assert_eq!(cmd.program, PathBuf::from("make"));
        assert_eq!(cmd.args, vec!["install"]);
        assert!(CommandSpec::from_argv(&[], "/work").is_none());
    }

    #[test]
    fn test_display_quotes_spaces() {
        let cmd = CommandSpec::new("./configure", "/w")
            .arg("--prefix=/opt/x")
            .arg("PYTHON_LDFLAGS=-undefined dynamic_lookup");
        assert_eq!(
            cmd.display(),
            "./configure --prefix=/opt/x 'PYTHON_LDFLAGS=-undefined dynamic_lookup'"
        );
    }
}
