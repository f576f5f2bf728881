//! User-requested build options.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::errors::{BuildError, BuildResult};

/// Options requested for one build.
///
/// Option values are explicit `with-X` / `without-X` requests; anything not
/// mentioned falls back to the recipe's declared default during resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildOptions {
    /// Explicitly requested option values
    pub requested: BTreeMap<String, bool>,

    /// Build from the head source instead of the stable release
    pub head: bool,

    /// Parallelism substituted for `{jobs}`
    pub jobs: usize,

    /// Extra compiler and linker flags appended to the build environment
    pub cflags: Vec<String>,
    pub cxxflags: Vec<String>,
    pub ldflags: Vec<String>,
}

impl BuildOptions {
    pub fn new() -> Self {
        BuildOptions {
            jobs: default_jobs(),
            ..Default::default()
        }
    }

    /// Parse `with-X` / `without-X` flags.
    ///
    /// Requesting both `with-X` and `without-X` is a conflict.
    pub fn from_flags<S: AsRef<str>>(flags: &[S]) -> BuildResult<Self> {
        let mut options = BuildOptions::new();
        for flag in flags {
            let flag = flag.as_ref();
            if let Some(name) = flag.strip_prefix("without-") {
                options.request(name, false)?;
            } else if let Some(name) = flag.strip_prefix("with-") {
                options.request(name, true)?;
            } else {
                return Err(BuildError::conflict(format!(
                    "unrecognized flag `{}`: expected `with-<option>` or `without-<option>`",
                    flag
                )));
            }
        }
        Ok(options)
    }

    /// Record a request for one option.
    pub fn request(&mut self, name: &str, enabled: bool) -> BuildResult<()> {
        if name.is_empty() {
            return Err(BuildError::conflict("empty option name"));
        }
        match self.requested.get(name) {
            Some(&prev) if prev != enabled => Err(BuildError::conflict(format!(
                "both `with-{0}` and `without-{0}` were requested",
                name
            ))),
            _ => {
                self.requested.insert(name.to_string(), enabled);
                Ok(())
            }
        }
    }

    pub fn with_head(mut self, head: bool) -> Self {
        self.head = head;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }
}

/// Number of parallel jobs when none is configured.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        let options = BuildOptions::from_flags(&["with-python3", "without-cairo"]).unwrap();
        assert_eq!(options.requested.get("python3"), Some(&true));
        assert_eq!(options.requested.get("cairo"), Some(&false));
        assert!(!options.head);
        assert!(options.jobs >= 1);
    }

    #[test]
    fn test_contradictory_flags_conflict() {
        let err = BuildOptions::from_flags(&["with-openmp", "without-openmp"]).unwrap_err();
        assert_eq!(err.kind(), "config-conflict");
        assert!(err.to_string().contains("openmp"));
    }

    #[test]
    fn test_repeated_flag_is_fine() {
        let options = BuildOptions::from_flags(&["with-x", "with-x"]).unwrap();
        assert_eq!(options.requested.len(), 1);
    }

    #[test]
    fn test_unrecognized_flag() {
        assert!(BuildOptions::from_flags(&["python3"]).is_err());
    }
}
