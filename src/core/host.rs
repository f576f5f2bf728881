//! Host facts: the read-only description of the machine performing a build.
//!
//! The resolver never inspects the running system itself; it reads a
//! [`HostFacts`] snapshot produced by a [`HostFactsProvider`]. Two providers
//! ship with the crate: [`SystemHost`] probes the OS and the active C++
//! compiler, and [`FileHost`] loads a TOML snapshot so a resolution can be
//! reproduced on another machine.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::version::DottedVersion;
use crate::util::config::ToolchainSettings;
use crate::util::process::{find_cxx_compiler, ProcessBuilder};

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Macos,
    Linux,
    Windows,
    Freebsd,
    Other,
}

impl OsFamily {
    /// The OS this binary was compiled for.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => OsFamily::Macos,
            "linux" => OsFamily::Linux,
            "windows" => OsFamily::Windows,
            "freebsd" => OsFamily::Freebsd,
            _ => OsFamily::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Macos => "macos",
            OsFamily::Linux => "linux",
            OsFamily::Windows => "windows",
            OsFamily::Freebsd => "freebsd",
            OsFamily::Other => "other",
        }
    }
}

impl FromStr for OsFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "macos" | "mac" | "darwin" | "osx" => Ok(OsFamily::Macos),
            "linux" => Ok(OsFamily::Linux),
            "windows" => Ok(OsFamily::Windows),
            "freebsd" => Ok(OsFamily::Freebsd),
            "other" => Ok(OsFamily::Other),
            _ => Err(format!(
                "unknown os `{}`, expected one of: macos, linux, windows, freebsd, other",
                s
            )),
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiler family as named in recipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompilerFamily {
    Gcc,
    Clang,
    /// The GCC frontend on an LLVM backend (`llvm-gcc`)
    LlvmGcc,
    Msvc,
}

impl CompilerFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerFamily::Gcc => "gcc",
            CompilerFamily::Clang => "clang",
            CompilerFamily::LlvmGcc => "llvm-gcc",
            CompilerFamily::Msvc => "msvc",
        }
    }
}

impl FromStr for CompilerFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gcc" | "g++" => Ok(CompilerFamily::Gcc),
            "clang" | "clang++" => Ok(CompilerFamily::Clang),
            "llvm-gcc" | "llvm" => Ok(CompilerFamily::LlvmGcc),
            "msvc" | "cl" => Ok(CompilerFamily::Msvc),
            _ => Err(format!(
                "unknown compiler `{}`, expected one of: gcc, clang, llvm-gcc, msvc",
                s
            )),
        }
    }
}

impl fmt::Display for CompilerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The active compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerFacts {
    pub family: CompilerFamily,

    pub version: DottedVersion,

    /// Vendor build number (Apple's `clang-800` is build 800)
    #[serde(default)]
    pub build: Option<u64>,

    /// Capabilities such as `openmp`, `cxx11`, `cxx14`
    #[serde(default)]
    pub features: BTreeSet<String>,

    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl CompilerFacts {
    pub fn new(family: CompilerFamily, version: DottedVersion) -> Self {
        CompilerFacts {
            family,
            version,
            build: None,
            features: BTreeSet::new(),
            path: None,
        }
    }

    pub fn with_build(mut self, build: u64) -> Self {
        self.build = Some(build);
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into());
        self
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Short human label, e.g. `gcc 4.8.5` or `clang 8.0.0 (build 800)`.
    pub fn label(&self) -> String {
        match self.build {
            Some(build) => format!("{} {} (build {})", self.family, self.version, build),
            None => format!("{} {}", self.family, self.version),
        }
    }
}

/// What the host knows about an already-installed dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledFacts {
    #[serde(default)]
    pub version: Option<String>,

    /// C++ standard library the dependency was built against (`libcxx`, `libstdcxx`)
    #[serde(default)]
    pub stdlib: Option<String>,
}

/// Read-only description of the build machine and its toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFacts {
    pub os: OsFamily,

    #[serde(default)]
    pub os_version: Option<DottedVersion>,

    #[serde(default)]
    pub arch: String,

    pub compiler: CompilerFacts,

    #[serde(default)]
    pub installed: BTreeMap<String, InstalledFacts>,
}

impl HostFacts {
    pub fn new(os: OsFamily, compiler: CompilerFacts) -> Self {
        HostFacts {
            os,
            os_version: None,
            arch: std::env::consts::ARCH.to_string(),
            compiler,
            installed: BTreeMap::new(),
        }
    }

    pub fn with_os_version(mut self, version: DottedVersion) -> Self {
        self.os_version = Some(version);
        self
    }

    pub fn with_installed(mut self, name: impl Into<String>, facts: InstalledFacts) -> Self {
        self.installed.insert(name.into(), facts);
        self
    }

    /// Load a host snapshot from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read host facts: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("failed to parse host facts: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// Source of host facts.
pub trait HostFactsProvider {
    fn host_facts(&self) -> Result<HostFacts>;
}

/// Host facts read from a TOML snapshot.
#[derive(Debug, Clone)]
pub struct FileHost {
    path: PathBuf,
}

impl FileHost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileHost { path: path.into() }
    }
}

impl HostFactsProvider for FileHost {
    fn host_facts(&self) -> Result<HostFacts> {
        HostFacts::load(&self.path)
    }
}

/// Host facts probed from the running system.
#[derive(Debug, Clone, Default)]
pub struct SystemHost {
    settings: ToolchainSettings,
}

impl SystemHost {
    pub fn new(settings: ToolchainSettings) -> Self {
        SystemHost { settings }
    }

    fn detect_compiler(&self) -> Result<CompilerFacts> {
        let path = self
            .settings
            .cxx
            .clone()
            .or_else(find_cxx_compiler)
            .ok_or_else(|| {
                anyhow!(
                    "no C++ compiler found\n\
                     Set CXX, configure `toolchain.cxx`, or pass a host file with --host"
                )
            })?;

        let output = ProcessBuilder::new(&path)
            .arg("--version")
            .exec_and_check()
            .with_context(|| format!("failed to query compiler version: {}", path.display()))?;
        let banner = String::from_utf8_lossy(&output.stdout);

        let mut facts = parse_compiler_banner(&banner).ok_or_else(|| {
            anyhow!(
                "unrecognized compiler `{}`: {}",
                path.display(),
                banner.lines().next().unwrap_or("")
            )
        })?;

        facts.features.extend(default_features(&facts));
        facts.features.extend(self.settings.features.iter().cloned());
        facts.path = Some(path);

        tracing::debug!("detected compiler {}", facts.label());
        Ok(facts)
    }
}

impl HostFactsProvider for SystemHost {
    fn host_facts(&self) -> Result<HostFacts> {
        let compiler = self.detect_compiler()?;
        let os = OsFamily::current();
        let mut facts = HostFacts::new(os, compiler);
        facts.os_version = detect_os_version(os);
        Ok(facts)
    }
}

fn detect_os_version(os: OsFamily) -> Option<DottedVersion> {
    let raw = match os {
        OsFamily::Macos => ProcessBuilder::new("sw_vers")
            .arg("-productVersion")
            .exec_and_check()
            .ok()
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string()),
        OsFamily::Linux => std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|s| os_release_version(&s)),
        _ => None,
    }?;

    raw.parse().ok()
}

fn os_release_version(contents: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        line.strip_prefix("VERSION_ID=")
            .map(|v| v.trim_matches('"').to_string())
    })
}

static CLANG_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:clang|LLVM) version (\d+(?:\.\d+)*)").unwrap());
static VENDOR_BUILD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:clang|LLVM build)[- ](\d+)").unwrap());
static GCC_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\)\s+(\d+(?:\.\d+)+)").unwrap());

/// Identify a compiler from its `--version` banner.
pub fn parse_compiler_banner(banner: &str) -> Option<CompilerFacts> {
    let first = banner.lines().next()?;

    if first.contains("llvm-g") {
        let version = GCC_VERSION.captures(first)?[1].parse().ok()?;
        let mut facts = CompilerFacts::new(CompilerFamily::LlvmGcc, version);
        facts.build = VENDOR_BUILD
            .captures(first)
            .and_then(|c| c[1].parse().ok());
        return Some(facts);
    }

    if let Some(caps) = CLANG_VERSION.captures(banner) {
        let version = caps[1].parse().ok()?;
        let mut facts = CompilerFacts::new(CompilerFamily::Clang, version);
        if banner.contains("Apple") {
            facts.build = VENDOR_BUILD
                .captures(banner)
                .and_then(|c| c[1].parse().ok());
        }
        return Some(facts);
    }

    if first.contains("gcc") || first.contains("g++") || first.contains("GCC") || first.starts_with("c++") {
        let version = GCC_VERSION.captures(first)?[1].parse().ok()?;
        return Some(CompilerFacts::new(CompilerFamily::Gcc, version));
    }

    None
}

/// Capabilities implied by a compiler's identity.
fn default_features(facts: &CompilerFacts) -> Vec<String> {
    let v = |s: &str| s.parse::<DottedVersion>().ok();
    let at_least = |min: &str| v(min).is_some_and(|min| facts.version >= min);

    let mut features = Vec::new();
    match facts.family {
        CompilerFamily::Gcc => {
            features.push("openmp");
            if at_least("4.8") {
                features.push("cxx11");
            }
            if at_least("5") {
                features.push("cxx14");
            }
        }
        CompilerFamily::Clang => {
            // Apple's clang ships without libomp.
            if facts.build.is_none() && at_least("3.8") {
                features.push("openmp");
            }
            if at_least("3.3") {
                features.push("cxx11");
            }
            if at_least("3.4") {
                features.push("cxx14");
            }
        }
        CompilerFamily::Msvc => features.push("openmp"),
        CompilerFamily::LlvmGcc => {}
    }

    features.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gcc_banners() {
        let facts = parse_compiler_banner(
            "g++ (Ubuntu 11.4.0-1ubuntu1~22.04) 11.4.0\nCopyright (C) 2021 Free Software Foundation, Inc.\n",
        )
        .unwrap();
        assert_eq!(facts.family, CompilerFamily::Gcc);
        assert_eq!(facts.version.to_string(), "11.4.0");

        let facts = parse_compiler_banner("g++-4.8 (GCC) 4.8.5\n").unwrap();
        assert_eq!(facts.version.to_string(), "4.8.5");
    }

    #[test]
    fn test_parse_apple_clang_banner() {
        let facts = parse_compiler_banner(
            "Apple LLVM version 8.0.0 (clang-800.0.42.1)\nTarget: x86_64-apple-darwin16.0.0\n",
        )
        .unwrap();
        assert_eq!(facts.family, CompilerFamily::Clang);
        assert_eq!(facts.version.to_string(), "8.0.0");
        assert_eq!(facts.build, Some(800));
        assert!(!default_features(&facts).contains(&"openmp".to_string()));
    }

    #[test]
    fn test_parse_upstream_clang_banner() {
        let facts = parse_compiler_banner("clang version 16.0.6\nTarget: x86_64-pc-linux-gnu\n").unwrap();
        assert_eq!(facts.family, CompilerFamily::Clang);
        assert_eq!(facts.build, None);
        assert!(default_features(&facts).contains(&"openmp".to_string()));
    }

    #[test]
    fn test_parse_llvm_gcc_banner() {
        let facts = parse_compiler_banner(
            "i686-apple-darwin11-llvm-g++-4.2 (GCC) 4.2.1 (Based on Apple Inc. build 5658) (LLVM build 2336.11.00)\n",
        )
        .unwrap();
        assert_eq!(facts.family, CompilerFamily::LlvmGcc);
        assert_eq!(facts.version.to_string(), "4.2.1");
        assert_eq!(facts.build, Some(2336));
    }

    #[test]
    fn test_unrecognized_banner() {
        assert!(parse_compiler_banner("Intel(R) oneAPI DPC++/C++ Compiler\n").is_none());
    }

    #[test]
    fn test_gcc_default_features() {
        let old = CompilerFacts::new(CompilerFamily::Gcc, "4.9.2".parse().unwrap());
        let features = default_features(&old);
        assert!(features.contains(&"cxx11".to_string()));
        assert!(!features.contains(&"cxx14".to_string()));
    }

    #[test]
    fn test_load_host_file() {
        let facts = HostFacts::parse(
            r#"
os = "macos"
os_version = "10.9"
arch = "x86_64"

[compiler]
family = "clang"
version = "6.0"
build = 600
features = ["cxx11"]

[installed.boost]
stdlib = "libcxx"
"#,
        )
        .unwrap();

        assert_eq!(facts.os, OsFamily::Macos);
        assert_eq!(facts.os_version, Some("10.9".parse().unwrap()));
        assert_eq!(facts.compiler.label(), "clang 6.0 (build 600)");
        assert_eq!(facts.installed["boost"].stdlib.as_deref(), Some("libcxx"));
    }

    #[test]
    fn test_os_release_version() {
        let contents = "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\n";
        assert_eq!(os_release_version(contents), Some("22.04".to_string()));
    }
}
