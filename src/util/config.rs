//! Configuration file support for Cellar.
//!
//! Cellar reads two configuration files:
//! - Global: `~/.cellar/config.toml` - user-wide defaults
//! - Project: `.cellar/config.toml` - overrides for the current directory
//!
//! Project config takes precedence over global config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Cellar configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Toolchain overrides
    pub toolchain: ToolchainSettings,

    /// Network settings
    pub net: NetConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Value substituted for `{jobs}` in recipe commands
    pub jobs: Option<usize>,

    /// Build independent variants concurrently
    pub parallel_variants: bool,

    /// Root under which install prefixes are created
    pub install_root: Option<PathBuf>,

    /// Root for per-build working directories
    pub work_dir: Option<PathBuf>,

    /// Keep working directories after a successful build
    pub keep_work: bool,
}

/// Toolchain overrides applied to host detection and the build environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    /// Path to the C compiler
    pub cc: Option<PathBuf>,

    /// Path to the C++ compiler
    pub cxx: Option<PathBuf>,

    /// Additional C compiler flags
    pub cflags: Vec<String>,

    /// Additional C++ compiler flags
    pub cxxflags: Vec<String>,

    /// Additional linker flags
    pub ldflags: Vec<String>,

    /// Compiler features to assume present (e.g. `openmp`)
    pub features: Vec<String>,
}

/// Network-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Never download; only use artifacts already in the cache
    pub offline: bool,

    /// Override for the download cache directory
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if the file is absent or broken.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.parallel_variants {
            self.build.parallel_variants = true;
        }
        if other.build.install_root.is_some() {
            self.build.install_root = other.build.install_root;
        }
        if other.build.work_dir.is_some() {
            self.build.work_dir = other.build.work_dir;
        }
        if other.build.keep_work {
            self.build.keep_work = true;
        }

        if other.toolchain.cc.is_some() {
            self.toolchain.cc = other.toolchain.cc;
        }
        if other.toolchain.cxx.is_some() {
            self.toolchain.cxx = other.toolchain.cxx;
        }
        if !other.toolchain.cflags.is_empty() {
            self.toolchain.cflags = other.toolchain.cflags;
        }
        if !other.toolchain.cxxflags.is_empty() {
            self.toolchain.cxxflags = other.toolchain.cxxflags;
        }
        if !other.toolchain.ldflags.is_empty() {
            self.toolchain.ldflags = other.toolchain.ldflags;
        }
        if !other.toolchain.features.is_empty() {
            self.toolchain.features = other.toolchain.features;
        }

        if other.net.offline {
            self.net.offline = true;
        }
        if other.net.cache_dir.is_some() {
            self.net.cache_dir = other.net.cache_dir;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.cellar/config.toml)
/// 2. Global config (~/.cellar/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(
            r#"
[build]
jobs = 8
parallel_variants = true
install_root = "/opt/cellar"

[toolchain]
cc = "/usr/bin/gcc-12"
cxxflags = ["-O2"]
features = ["openmp"]

[net]
offline = true
"#,
        )
        .unwrap();

        assert_eq!(config.build.jobs, Some(8));
        assert!(config.build.parallel_variants);
        assert_eq!(config.build.install_root, Some(PathBuf::from("/opt/cellar")));
        assert_eq!(config.toolchain.cc, Some(PathBuf::from("/usr/bin/gcc-12")));
        assert_eq!(config.toolchain.features, vec!["openmp"]);
        assert!(config.net.offline);
    }

    #[test]
    fn test_project_overrides_global() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        let project = tmp.path().join("project.toml");

        std::fs::write(&global, "[build]\njobs = 2\n[toolchain]\ncxxflags = [\"-O1\"]\n").unwrap();
        std::fs::write(&project, "[build]\njobs = 16\n").unwrap();

        let config = load_config(&global, &project);
        assert_eq!(config.build.jobs, Some(16));
        assert_eq!(config.toolchain.cxxflags, vec!["-O1"]);
    }

    #[test]
    fn test_broken_config_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[build\njobs = ").unwrap();

        let config = Config::load_or_default(&path);
        assert_eq!(config.build.jobs, None);
    }
}
