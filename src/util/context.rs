//! Global context for Cellar operations.
//!
//! Provides centralized access to configuration and well-known paths.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;

use crate::util::config::{load_config, Config};

/// Environment variable overriding the Cellar home directory.
pub const CELLAR_HOME_ENV: &str = "CELLAR_HOME";

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global Cellar data (~/.cellar/)
    home: PathBuf,

    /// Merged global + project configuration
    config: Config,

    /// Whether to use verbose output
    verbose: bool,

    /// Whether to use colors in output
    color: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext rooted at the current directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Self::with_cwd(cwd)
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let home = match std::env::var_os(CELLAR_HOME_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => BaseDirs::new()
                .map(|b| b.home_dir().join(".cellar"))
                .unwrap_or_else(|| PathBuf::from(".cellar")),
        };

        let config = load_config(
            &home.join("config.toml"),
            &cwd.join(".cellar").join("config.toml"),
        );

        Ok(GlobalContext {
            cwd,
            home,
            config,
            verbose: false,
            color: true,
        })
    }

    /// Replace the loaded configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Set color output.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the Cellar home directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Get the merged configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory holding downloaded sources and patches.
    pub fn cache_dir(&self) -> PathBuf {
        self.config
            .net
            .cache_dir
            .clone()
            .unwrap_or_else(|| self.home.join("cache"))
    }

    /// Root for per-build working directories.
    pub fn work_dir(&self) -> PathBuf {
        self.config
            .build
            .work_dir
            .clone()
            .unwrap_or_else(|| self.home.join("work"))
    }

    /// Root under which install prefixes are created.
    pub fn install_root(&self) -> PathBuf {
        self.config
            .build
            .install_root
            .clone()
            .unwrap_or_else(|| self.home.join("cellar"))
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if color output is enabled.
    pub fn color(&self) -> bool {
        self.color
    }

    /// Resolve a user-supplied path against the working directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}
