//! Recipe model.
//!
//! A recipe is a TOML document describing how to fetch, patch, configure,
//! compile, install and smoke-test one package. [`Recipe::parse`] reads the
//! document into raw serde structs, then validates it into an immutable
//! [`Recipe`]: checksums are checked for shape, every `when` condition is
//! parsed, and every command template is checked against the placeholders
//! it may use.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{BuildError, BuildResult};
use crate::core::host::CompilerFamily;
use crate::core::predicate::Predicate;
use crate::core::template::{self, PLAN_PLACEHOLDERS};
use crate::core::version::DottedVersion;
use crate::util::fs::is_contained_relative;
use crate::util::hash::is_sha256_hex;

/// Name of the variant used when a recipe declares none.
pub const DEFAULT_VARIANT: &str = "default";

/// Placeholders available in every template.
pub const BASE_PLACEHOLDERS: &[&str] = &["name", "version", "pkg_version", "jobs"];

/// Source channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Stable,
    Head,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Stable => f.write_str("stable"),
            Channel::Head => f.write_str("head"),
        }
    }
}

/// Where the package source comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub url: String,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default)]
    pub channel: Channel,
}

/// A patch applied to the unpacked source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub url: String,
    pub sha256: String,
    /// Leading path components stripped (`patch -pN`)
    pub strip: u32,
    pub when: Option<Predicate>,
}

/// A user-selectable option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionDecl {
    pub name: String,
    pub default: bool,
    pub description: String,
    /// Dependency that implicitly declared this option
    pub dependency: Option<String>,
}

/// How strongly a dependency is wanted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyTier {
    #[default]
    Required,
    /// Enabled unless `without-<name>` is requested
    Recommended,
    /// Disabled unless `with-<name>` is requested
    Optional,
}

impl DependencyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyTier::Required => "required",
            DependencyTier::Recommended => "recommended",
            DependencyTier::Optional => "optional",
        }
    }
}

/// An option flag forwarded to a dependency's own build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedOption {
    pub flag: String,
    pub when: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub name: String,
    pub tier: DependencyTier,
    /// Needed only while building
    pub build: bool,
    pub when: Option<Predicate>,
    pub options: Vec<ForwardedOption>,
}

impl DependencySpec {
    /// Name of the option gating this dependency, if any.
    pub fn gate_option(&self) -> Option<&str> {
        match self.tier {
            DependencyTier::Required => None,
            DependencyTier::Recommended | DependencyTier::Optional => Some(&self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintAction {
    #[default]
    Reject,
    Accept,
}

/// A rule accepting or rejecting a compiler.
///
/// A rule matches when the compiler family is equal, the compiler version
/// falls in the `version` series (if given), the vendor build number is at
/// most `build` (if given), and `when` holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainConstraint {
    pub compiler: CompilerFamily,
    pub version: Option<DottedVersion>,
    pub build: Option<u64>,
    pub action: ConstraintAction,
    pub cause: Option<String>,
    pub when: Option<Predicate>,
}

impl ToolchainConstraint {
    /// Human description such as `gcc 4.8` or `clang build <= 699`.
    pub fn describe(&self) -> String {
        let mut out = self.compiler.to_string();
        if let Some(ref v) = self.version {
            out.push_str(&format!(" {}", v));
        }
        if let Some(b) = self.build {
            out.push_str(&format!(" build <= {}", b));
        }
        out
    }
}

/// A compiler capability the build needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub needs: String,
    pub when: Option<Predicate>,
}

/// A combination of options and host facts the build refuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRule {
    pub when: Predicate,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvMode {
    /// Append to the existing value, space separated
    Append,
    /// Replace the value
    Set,
}

/// An explicit build environment change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvTweak {
    pub name: String,
    pub value: String,
    pub mode: EnvMode,
    pub when: Option<Predicate>,
}

/// A command line whose arguments are templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub argv: Vec<String>,
    pub when: Option<Predicate>,
}

/// A configure argument, possibly conditional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureArg {
    pub arg: String,
    pub when: Option<Predicate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildCommands {
    /// Run once in the shared source tree after patching
    pub prepare: Vec<CommandLine>,
    pub configure: Option<Vec<String>>,
    pub configure_args: Vec<ConfigureArg>,
    pub compile: Option<Vec<String>>,
    pub install: Vec<String>,
}

/// In-place text substitution in a variant's staged source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEdit {
    /// Path relative to the source root
    pub file: String,
    pub from: String,
    pub to: String,
}

/// One independently built flavor of the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub name: String,
    pub when: Option<Predicate>,
    pub vars: BTreeMap<String, String>,
    pub configure_args: Vec<ConfigureArg>,
    pub env: BTreeMap<String, String>,
    pub edits: Vec<SourceEdit>,
}

impl Variant {
    /// The variant built when a recipe declares none.
    pub fn implicit_default() -> Self {
        Variant {
            name: DEFAULT_VARIANT.to_string(),
            when: None,
            vars: BTreeMap::new(),
            configure_args: Vec::new(),
            env: BTreeMap::new(),
            edits: Vec::new(),
        }
    }
}

/// Post-install smoke test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmokeTest {
    /// File name to literal contents, written before running
    pub files: BTreeMap<String, String>,
    pub run: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// A validated recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub name: String,
    pub desc: Option<String>,
    pub homepage: Option<String>,
    pub version: String,
    pub revision: u32,
    pub sources: Vec<SourceSpec>,
    pub patches: Vec<Patch>,
    /// Declared options followed by options implied by dependency tiers
    pub options: Vec<OptionDecl>,
    pub dependencies: Vec<DependencySpec>,
    pub toolchain: Vec<ToolchainConstraint>,
    pub requirements: Vec<Requirement>,
    pub conflicts: Vec<ConflictRule>,
    pub env: Vec<EnvTweak>,
    pub build: BuildCommands,
    /// Declared variants, or the implicit default variant
    pub variants: Vec<Variant>,
    pub test: Option<SmokeTest>,
    /// Directory relative source paths are resolved against
    pub root: PathBuf,
}

impl Recipe {
    /// Load and validate a recipe file.
    pub fn load(path: &Path) -> BuildResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BuildError::io(format!("failed to read recipe {}", path.display()), e))?;
        let root = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let mut recipe = Self::parse(&contents)?;
        recipe.root = root;
        Ok(recipe)
    }

    /// Parse and validate recipe text.
    pub fn parse(contents: &str) -> BuildResult<Self> {
        let raw: RawRecipe = toml::from_str(contents)
            .map_err(|e| BuildError::malformed("recipe", e.message().to_string()))?;
        raw.validate()
    }

    /// Version including the packaging revision (`2.18_4`).
    pub fn pkg_version(&self) -> String {
        if self.revision > 0 {
            format!("{}_{}", self.version, self.revision)
        } else {
            self.version.clone()
        }
    }

    pub fn option(&self, name: &str) -> Option<&OptionDecl> {
        self.options.iter().find(|o| o.name == name)
    }

    pub fn source(&self, channel: Channel) -> Option<&SourceSpec> {
        self.sources.iter().find(|s| s.channel == channel)
    }

    /// Whether variants were declared rather than implied.
    pub fn has_declared_variants(&self) -> bool {
        !(self.variants.len() == 1 && self.variants[0].name == DEFAULT_VARIANT && self.variants[0].when.is_none())
    }

    /// Variable names every variant defines.
    pub fn common_vars(&self) -> BTreeSet<String> {
        let mut iter = self.variants.iter();
        let first = match iter.next() {
            Some(v) => v.vars.keys().cloned().collect::<BTreeSet<_>>(),
            None => return BTreeSet::new(),
        };
        iter.fold(first, |acc, v| {
            acc.into_iter().filter(|k| v.vars.contains_key(k)).collect()
        })
    }
}

// ---------------------------------------------------------------------------
// Raw TOML layer
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRecipe {
    name: Option<String>,
    desc: Option<String>,
    homepage: Option<String>,
    version: Option<String>,
    #[serde(default)]
    revision: u32,
    #[serde(default)]
    source: Vec<RawSource>,
    #[serde(default)]
    patch: Vec<RawPatch>,
    #[serde(default)]
    option: Vec<RawOption>,
    #[serde(default)]
    dependency: Vec<RawDependency>,
    #[serde(default)]
    toolchain: Vec<RawConstraint>,
    #[serde(default)]
    requires: Vec<RawRequirement>,
    #[serde(default)]
    conflict: Vec<RawConflict>,
    #[serde(default)]
    env: Vec<RawEnv>,
    #[serde(default)]
    build: RawBuild,
    #[serde(default)]
    variant: Vec<RawVariant>,
    test: Option<RawTest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSource {
    url: Option<String>,
    sha256: Option<String>,
    revision: Option<String>,
    #[serde(default)]
    channel: Channel,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPatch {
    url: Option<String>,
    sha256: Option<String>,
    #[serde(default = "default_strip")]
    strip: u32,
    when: Option<String>,
}

fn default_strip() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOption {
    name: String,
    #[serde(default)]
    default: bool,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawForwarded {
    Flag(String),
    Conditional { flag: String, when: Option<String> },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDependency {
    name: String,
    #[serde(default)]
    tier: DependencyTier,
    #[serde(default)]
    build: bool,
    when: Option<String>,
    #[serde(default)]
    options: Vec<RawForwarded>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConstraint {
    compiler: String,
    version: Option<String>,
    build: Option<u64>,
    #[serde(default)]
    action: ConstraintAction,
    cause: Option<String>,
    when: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRequirement {
    needs: String,
    when: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConflict {
    when: String,
    detail: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEnv {
    name: String,
    append: Option<String>,
    set: Option<String>,
    when: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawArgv {
    Line(String),
    Argv(Vec<String>),
}

impl RawArgv {
    fn into_argv(self) -> Vec<String> {
        match self {
            RawArgv::Line(line) => line.split_whitespace().map(String::from).collect(),
            RawArgv::Argv(argv) => argv,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCommand {
    Plain(RawArgv),
    Conditional { run: RawArgv, when: Option<String> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawArg {
    Plain(String),
    Conditional { arg: String, when: Option<String> },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBuild {
    #[serde(default)]
    prepare: Vec<RawCommand>,
    configure: Option<RawArgv>,
    #[serde(default)]
    configure_args: Vec<RawArg>,
    compile: Option<RawArgv>,
    install: Option<RawArgv>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVariant {
    name: String,
    when: Option<String>,
    #[serde(default)]
    vars: BTreeMap<String, String>,
    #[serde(default)]
    configure_args: Vec<RawArg>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    edit: Vec<SourceEdit>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTest {
    #[serde(default)]
    files: BTreeMap<String, String>,
    run: RawArgv,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn required(value: Option<String>, field: &str) -> BuildResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(BuildError::malformed(field, "missing required field")),
    }
}

fn checksum(value: Option<String>, field: &str) -> BuildResult<String> {
    let value = required(value, field)?;
    if !is_sha256_hex(&value) {
        return Err(BuildError::malformed(
            field,
            format!("`{}` is not a 64-digit hex SHA-256", value),
        ));
    }
    Ok(value.to_ascii_lowercase())
}

fn location(value: Option<String>, field: &str) -> BuildResult<String> {
    let value = required(value, field)?;
    if value.contains("://") {
        let parsed = url::Url::parse(&value)
            .map_err(|e| BuildError::malformed(field, format!("invalid URL `{}`: {}", value, e)))?;
        match parsed.scheme() {
            "http" | "https" | "file" => {}
            other => {
                return Err(BuildError::malformed(
                    field,
                    format!("unsupported URL scheme `{}`", other),
                ))
            }
        }
    }
    Ok(value)
}

fn condition(value: Option<String>, field: &str) -> BuildResult<Option<Predicate>> {
    value
        .map(|src| Predicate::parse(&src).map_err(|e| BuildError::malformed(field, e.to_string())))
        .transpose()
}

fn check_template(text: &str, allowed: &[&str], field: &str) -> BuildResult<()> {
    template::check(text, allowed).map_err(|e| BuildError::malformed(field, e.to_string()))
}

fn check_argv(argv: &[String], allowed: &[&str], field: &str) -> BuildResult<()> {
    if argv.is_empty() {
        return Err(BuildError::malformed(field, "empty command"));
    }
    argv.iter()
        .try_for_each(|arg| check_template(arg, allowed, field))
}

fn conditional_arg(raw: RawArg, field: &str) -> BuildResult<ConfigureArg> {
    match raw {
        RawArg::Plain(arg) => Ok(ConfigureArg { arg, when: None }),
        RawArg::Conditional { arg, when } => Ok(ConfigureArg {
            arg,
            when: condition(when, &format!("{}.when", field))?,
        }),
    }
}

impl RawRecipe {
    fn validate(self) -> BuildResult<Recipe> {
        let name = required(self.name, "name")?;
        let version = required(self.version, "version")?;

        // Sources
        if self.source.is_empty() {
            return Err(BuildError::malformed("source", "at least one source is required"));
        }
        let mut sources = Vec::with_capacity(self.source.len());
        for (i, raw) in self.source.into_iter().enumerate() {
            let field = format!("source[{}]", i);
            sources.push(SourceSpec {
                url: location(raw.url, &format!("{}.url", field))?,
                sha256: checksum(raw.sha256, &format!("{}.sha256", field))?,
                revision: raw.revision,
                channel: raw.channel,
            });
        }
        for channel in [Channel::Stable, Channel::Head] {
            let count = sources.iter().filter(|s| s.channel == channel).count();
            if count > 1 {
                return Err(BuildError::AmbiguousSource {
                    channel: channel.to_string(),
                    count,
                });
            }
        }

        // Patches
        let mut patches = Vec::with_capacity(self.patch.len());
        for (i, raw) in self.patch.into_iter().enumerate() {
            let field = format!("patch[{}]", i);
            patches.push(Patch {
                url: location(raw.url, &format!("{}.url", field))?,
                sha256: checksum(raw.sha256, &format!("{}.sha256", field))?,
                strip: raw.strip,
                when: condition(raw.when, &format!("{}.when", field))?,
            });
        }

        // Options: declared first, then those implied by dependency tiers.
        let mut options: Vec<OptionDecl> = Vec::new();
        for raw in self.option {
            let field = format!("option.{}", raw.name);
            if raw.name.is_empty() || raw.name.contains(char::is_whitespace) {
                return Err(BuildError::malformed(field, "invalid option name"));
            }
            if options.iter().any(|o| o.name == raw.name) {
                return Err(BuildError::malformed(field, "duplicate option"));
            }
            options.push(OptionDecl {
                name: raw.name,
                default: raw.default,
                description: raw.description,
                dependency: None,
            });
        }

        let mut dependencies = Vec::with_capacity(self.dependency.len());
        for raw in self.dependency {
            let field = format!("dependency.{}", raw.name);
            let mut forwarded = Vec::with_capacity(raw.options.len());
            for (i, opt) in raw.options.into_iter().enumerate() {
                forwarded.push(match opt {
                    RawForwarded::Flag(flag) => ForwardedOption { flag, when: None },
                    RawForwarded::Conditional { flag, when } => ForwardedOption {
                        flag,
                        when: condition(when, &format!("{}.options[{}].when", field, i))?,
                    },
                });
            }
            let dep = DependencySpec {
                name: raw.name,
                tier: raw.tier,
                build: raw.build,
                when: condition(raw.when, &format!("{}.when", field))?,
                options: forwarded,
            };

            if let Some(gate) = dep.gate_option() {
                if !options.iter().any(|o| o.name == gate) {
                    options.push(OptionDecl {
                        name: gate.to_string(),
                        default: dep.tier == DependencyTier::Recommended,
                        description: format!("Build with {} support", gate),
                        dependency: Some(dep.name.clone()),
                    });
                }
            }
            dependencies.push(dep);
        }

        // Toolchain constraints and requirements
        let mut toolchain = Vec::with_capacity(self.toolchain.len());
        for (i, raw) in self.toolchain.into_iter().enumerate() {
            let field = format!("toolchain[{}]", i);
            let compiler = raw
                .compiler
                .parse()
                .map_err(|e: String| BuildError::malformed(format!("{}.compiler", field), e))?;
            let version = raw
                .version
                .map(|v| v.parse::<DottedVersion>())
                .transpose()
                .map_err(|e| BuildError::malformed(format!("{}.version", field), e.to_string()))?;
            toolchain.push(ToolchainConstraint {
                compiler,
                version,
                build: raw.build,
                action: raw.action,
                cause: raw.cause,
                when: condition(raw.when, &format!("{}.when", field))?,
            });
        }

        let mut requirements = Vec::with_capacity(self.requires.len());
        for (i, raw) in self.requires.into_iter().enumerate() {
            requirements.push(Requirement {
                needs: raw.needs,
                when: condition(raw.when, &format!("requires[{}].when", i))?,
            });
        }

        let mut conflicts = Vec::with_capacity(self.conflict.len());
        for (i, raw) in self.conflict.into_iter().enumerate() {
            let field = format!("conflict[{}].when", i);
            let when = condition(Some(raw.when), &field)?
                .ok_or_else(|| BuildError::malformed(field, "missing condition"))?;
            conflicts.push(ConflictRule {
                when,
                detail: raw.detail,
            });
        }

        let mut env = Vec::with_capacity(self.env.len());
        for (i, raw) in self.env.into_iter().enumerate() {
            let field = format!("env[{}]", i);
            let (value, mode) = match (raw.append, raw.set) {
                (Some(v), None) => (v, EnvMode::Append),
                (None, Some(v)) => (v, EnvMode::Set),
                _ => {
                    return Err(BuildError::malformed(
                        field,
                        "exactly one of `append` or `set` is required",
                    ))
                }
            };
            check_template(&value, BASE_PLACEHOLDERS, &field)?;
            env.push(EnvTweak {
                name: raw.name,
                value,
                mode,
                when: condition(raw.when, &format!("{}.when", field))?,
            });
        }

        // Variants
        let mut variants = Vec::with_capacity(self.variant.len());
        for raw in self.variant {
            let field = format!("variant.{}", raw.name);
            if raw.name.is_empty() || raw.name.contains(['/', '\\']) || raw.name == "." || raw.name == ".." {
                return Err(BuildError::malformed(field, "invalid variant name"));
            }
            if variants.iter().any(|v: &Variant| v.name == raw.name) {
                return Err(BuildError::malformed(field, "duplicate variant"));
            }
            let mut configure_args = Vec::with_capacity(raw.configure_args.len());
            for (i, arg) in raw.configure_args.into_iter().enumerate() {
                configure_args.push(conditional_arg(arg, &format!("{}.configure_args[{}]", field, i))?);
            }
            variants.push(Variant {
                name: raw.name,
                when: condition(raw.when, &format!("{}.when", field))?,
                vars: raw.vars,
                configure_args,
                env: raw.env,
                edits: raw.edit,
            });
        }
        if variants.is_empty() {
            variants.push(Variant::implicit_default());
        }

        // Build commands
        let mut prepare = Vec::with_capacity(self.build.prepare.len());
        for (i, raw) in self.build.prepare.into_iter().enumerate() {
            let field = format!("build.prepare[{}]", i);
            prepare.push(match raw {
                RawCommand::Plain(argv) => CommandLine {
                    argv: argv.into_argv(),
                    when: None,
                },
                RawCommand::Conditional { run, when } => CommandLine {
                    argv: run.into_argv(),
                    when: condition(when, &format!("{}.when", field))?,
                },
            });
        }
        let mut configure_args = Vec::with_capacity(self.build.configure_args.len());
        for (i, arg) in self.build.configure_args.into_iter().enumerate() {
            configure_args.push(conditional_arg(arg, &format!("build.configure_args[{}]", i))?);
        }
        let install = self
            .build
            .install
            .map(RawArgv::into_argv)
            .ok_or_else(|| BuildError::malformed("build.install", "missing required field"))?;
        let build = BuildCommands {
            prepare,
            configure: self.build.configure.map(RawArgv::into_argv),
            configure_args,
            compile: self.build.compile.map(RawArgv::into_argv),
            install,
        };

        let test = self.test.map(|raw| SmokeTest {
            files: raw.files,
            run: raw.run.into_argv(),
            env: raw.env,
        });

        let recipe = Recipe {
            name,
            desc: self.desc,
            homepage: self.homepage,
            version,
            revision: self.revision,
            sources,
            patches,
            options,
            dependencies,
            toolchain,
            requirements,
            conflicts,
            env,
            build,
            variants,
            test,
            root: PathBuf::from("."),
        };

        check_option_references(&recipe)?;
        check_templates(&recipe)?;
        Ok(recipe)
    }
}

/// Every `with X` / `without X` must name a declared option.
fn check_option_references(recipe: &Recipe) -> BuildResult<()> {
    let mut conditions: Vec<(String, &Predicate)> = Vec::new();
    for (i, p) in recipe.patches.iter().enumerate() {
        conditions.extend(p.when.iter().map(|w| (format!("patch[{}].when", i), w)));
    }
    for d in &recipe.dependencies {
        conditions.extend(d.when.iter().map(|w| (format!("dependency.{}.when", d.name), w)));
        for (i, o) in d.options.iter().enumerate() {
            conditions.extend(
                o.when
                    .iter()
                    .map(|w| (format!("dependency.{}.options[{}].when", d.name, i), w)),
            );
        }
    }
    for (i, t) in recipe.toolchain.iter().enumerate() {
        conditions.extend(t.when.iter().map(|w| (format!("toolchain[{}].when", i), w)));
    }
    for (i, r) in recipe.requirements.iter().enumerate() {
        conditions.extend(r.when.iter().map(|w| (format!("requires[{}].when", i), w)));
    }
    for (i, c) in recipe.conflicts.iter().enumerate() {
        conditions.push((format!("conflict[{}].when", i), &c.when));
    }
    for (i, e) in recipe.env.iter().enumerate() {
        conditions.extend(e.when.iter().map(|w| (format!("env[{}].when", i), w)));
    }
    for (i, c) in recipe.build.prepare.iter().enumerate() {
        conditions.extend(c.when.iter().map(|w| (format!("build.prepare[{}].when", i), w)));
    }
    for (i, a) in recipe.build.configure_args.iter().enumerate() {
        conditions.extend(a.when.iter().map(|w| (format!("build.configure_args[{}].when", i), w)));
    }
    for v in &recipe.variants {
        conditions.extend(v.when.iter().map(|w| (format!("variant.{}.when", v.name), w)));
        for (i, a) in v.configure_args.iter().enumerate() {
            conditions.extend(
                a.when
                    .iter()
                    .map(|w| (format!("variant.{}.configure_args[{}].when", v.name, i), w)),
            );
        }
    }

    for (field, predicate) in conditions {
        for name in predicate.referenced_options() {
            if recipe.option(name).is_none() {
                return Err(BuildError::malformed(
                    field,
                    format!("condition refers to undeclared option `{}`", name),
                ));
            }
        }
    }
    Ok(())
}

/// Every template may only use placeholders that will be bound for it.
fn check_templates(recipe: &Recipe) -> BuildResult<()> {
    let per_build: Vec<&str> = BASE_PLACEHOLDERS
        .iter()
        .chain(["srcdir"].iter())
        .copied()
        .collect();

    for (i, cmd) in recipe.build.prepare.iter().enumerate() {
        check_argv(&cmd.argv, &per_build, &format!("build.prepare[{}]", i))?;
    }

    let mut per_variant: Vec<&str> = BASE_PLACEHOLDERS
        .iter()
        .chain(PLAN_PLACEHOLDERS.iter())
        .chain(["variant"].iter())
        .copied()
        .collect();
    let var_placeholders = per_variant.clone();

    for v in &recipe.variants {
        let field = format!("variant.{}", v.name);
        for (key, value) in &v.vars {
            if per_variant.contains(&key.as_str()) {
                return Err(BuildError::malformed(
                    format!("{}.vars.{}", field, key),
                    "variable shadows a built-in placeholder",
                ));
            }
            check_template(value, &var_placeholders, &format!("{}.vars.{}", field, key))?;
        }
    }

    let common = recipe.common_vars();
    per_variant.extend(common.iter().map(String::as_str));

    if let Some(ref configure) = recipe.build.configure {
        check_argv(configure, &per_variant, "build.configure")?;
    }
    for (i, a) in recipe.build.configure_args.iter().enumerate() {
        check_template(&a.arg, &per_variant, &format!("build.configure_args[{}]", i))?;
    }
    if let Some(ref compile) = recipe.build.compile {
        check_argv(compile, &per_variant, "build.compile")?;
    }
    check_argv(&recipe.build.install, &per_variant, "build.install")?;

    if let Some(ref test) = recipe.test {
        check_argv(&test.run, &per_variant, "test.run")?;
        for (key, value) in &test.env {
            check_template(value, &per_variant, &format!("test.env.{}", key))?;
        }
        for name in test.files.keys() {
            if !is_contained_relative(name) {
                return Err(BuildError::malformed(
                    format!("test.files.{}", name),
                    "test file names must be relative",
                ));
            }
        }
    }

    for v in &recipe.variants {
        let field = format!("variant.{}", v.name);
        let own: Vec<&str> = BASE_PLACEHOLDERS
            .iter()
            .chain(PLAN_PLACEHOLDERS.iter())
            .chain(["variant"].iter())
            .copied()
            .chain(v.vars.keys().map(String::as_str))
            .collect();
        for (i, a) in v.configure_args.iter().enumerate() {
            check_template(&a.arg, &own, &format!("{}.configure_args[{}]", field, i))?;
        }
        for (key, value) in &v.env {
            check_template(value, &own, &format!("{}.env.{}", field, key))?;
        }
        for (i, e) in v.edits.iter().enumerate() {
            let edit_field = format!("{}.edit[{}]", field, i);
            if e.from.is_empty() {
                return Err(BuildError::malformed(edit_field, "`from` must not be empty"));
            }
            if !is_contained_relative(&e.file) {
                return Err(BuildError::malformed(edit_field, "edited file must be relative to the source root"));
            }
            check_template(&e.from, &own, &edit_field)?;
            check_template(&e.to, &own, &edit_field)?;
        }
    }

    Ok(())
}
