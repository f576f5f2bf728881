//! Option and constraint resolution.
//!
//! [`resolve`] turns a recipe, the requested options and the host facts into
//! a [`ResolvedConfig`]: an immutable snapshot of everything the build will
//! do. Resolution performs no I/O and uses ordered maps throughout, so equal
//! inputs always produce byte-identical JSON.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::errors::{BuildError, BuildResult};
use crate::core::host::HostFacts;
use crate::core::options::BuildOptions;
use crate::core::predicate::{EvalContext, Predicate};
use crate::core::recipe::{
    Channel, ConfigureArg, DependencyTier, EnvMode, Recipe, SourceEdit, SourceSpec, Variant,
};
use crate::core::template::{self, PLAN_PLACEHOLDERS};
use crate::resolver::toolchain::{self, ToolchainDecision};
use crate::util::hash::sha256_str;

/// A patch selected for this build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPatch {
    pub url: String,
    pub sha256: String,
    pub strip: u32,
}

/// A dependency that applies to this build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDependency {
    pub name: String,
    pub tier: DependencyTier,
    pub build_only: bool,
    /// Option flags forwarded to the dependency's build
    pub options: Vec<String>,
}

/// Smoke test bound to one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTest {
    /// Literal file contents; not templates
    pub files: BTreeMap<String, String>,
    pub run: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// One variant with its commands expanded.
///
/// Strings here are templates that only reference the plan-time
/// placeholders `{prefix}` and `{srcdir}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedVariant {
    pub name: String,
    pub vars: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub edits: Vec<SourceEdit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configure: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile: Option<Vec<String>>,
    pub install: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<ResolvedTest>,
}

/// The fully resolved build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
    pub name: String,
    pub version: String,
    pub pkg_version: String,
    pub channel: Channel,
    pub source: SourceSpec,
    pub patches: Vec<ResolvedPatch>,
    pub options: BTreeMap<String, bool>,
    pub dependencies: Vec<ResolvedDependency>,
    pub toolchain: ToolchainDecision,
    pub jobs: usize,
    /// Environment shared by every step
    pub env: BTreeMap<String, String>,
    pub prepare: Vec<Vec<String>>,
    pub variants: Vec<ResolvedVariant>,
}

impl ResolvedConfig {
    /// Canonical JSON form.
    pub fn to_json(&self) -> String {
        // Serializing plain structs, strings and ordered maps cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// SHA-256 of the canonical JSON form.
    pub fn fingerprint(&self) -> String {
        sha256_str(&self.to_json())
    }

    pub fn variant(&self, name: &str) -> Option<&ResolvedVariant> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Dependencies needed at run time.
    pub fn runtime_dependencies(&self) -> impl Iterator<Item = &ResolvedDependency> {
        self.dependencies.iter().filter(|d| !d.build_only)
    }
}

fn holds(when: &Option<Predicate>, ctx: &EvalContext<'_>) -> bool {
    when.as_ref().is_none_or(|w| w.eval(ctx))
}

fn malformed_template(field: &str) -> impl Fn(template::TemplateError) -> BuildError + '_ {
    move |e| BuildError::malformed(field, e.to_string())
}

fn substitute_all(
    argv: &[String],
    fragments: &BTreeMap<String, String>,
    field: &str,
) -> BuildResult<Vec<String>> {
    argv.iter()
        .map(|arg| {
            template::substitute(arg, fragments, PLAN_PLACEHOLDERS).map_err(malformed_template(field))
        })
        .collect()
}

fn active_args<'a>(args: &'a [ConfigureArg], ctx: &EvalContext<'_>) -> Vec<&'a String> {
    args.iter()
        .filter(|a| holds(&a.when, ctx))
        .map(|a| &a.arg)
        .collect()
}

/// Resolve options, dependencies, toolchain and commands for one build.
///
/// # Algorithm
///
/// 1. Each declared option takes its requested value, else its default.
///    Requests for undeclared options are a `ConfigConflict`.
///
/// 2. The source for the requested channel is selected.
///
/// 3. Dependencies are filtered by tier gate and condition; forwarded
///    options are filtered by their own conditions.
///
/// 4. Toolchain constraints and feature requirements are checked.
///
/// 5. Conflict rules are checked, and the enabled variants are selected.
///
/// 6. The environment and every command template are expanded.
pub fn resolve(
    recipe: &Recipe,
    options: &BuildOptions,
    host: &HostFacts,
) -> BuildResult<ResolvedConfig> {
    // 1. Options
    for name in options.requested.keys() {
        if recipe.option(name).is_none() {
            let known: Vec<&str> = recipe.options.iter().map(|o| o.name.as_str()).collect();
            return Err(BuildError::conflict(format!(
                "unknown option `{}` (available: {})",
                name,
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            )));
        }
    }
    let values: BTreeMap<String, bool> = recipe
        .options
        .iter()
        .map(|o| {
            let value = options.requested.get(&o.name).copied().unwrap_or(o.default);
            (o.name.clone(), value)
        })
        .collect();

    // 2. Source
    let channel = if options.head {
        Channel::Head
    } else {
        Channel::Stable
    };
    let source = recipe.source(channel).cloned().ok_or_else(|| match channel {
        Channel::Head => BuildError::conflict(format!("`{}` has no head source", recipe.name)),
        Channel::Stable => BuildError::conflict(format!(
            "`{}` has no stable source; build with --head",
            recipe.name
        )),
    })?;

    let ctx = EvalContext {
        options: &values,
        head: options.head,
        host,
    };

    let patches = recipe
        .patches
        .iter()
        .filter(|p| holds(&p.when, &ctx))
        .map(|p| ResolvedPatch {
            url: p.url.clone(),
            sha256: p.sha256.clone(),
            strip: p.strip,
        })
        .collect();

    // 3. Dependencies
    let dependencies = recipe
        .dependencies
        .iter()
        .filter(|d| {
            let gated_on = d
                .gate_option()
                .is_none_or(|gate| values.get(gate).copied().unwrap_or(false));
            gated_on && holds(&d.when, &ctx)
        })
        .map(|d| ResolvedDependency {
            name: d.name.clone(),
            tier: d.tier,
            build_only: d.build,
            options: d
                .options
                .iter()
                .filter(|o| holds(&o.when, &ctx))
                .map(|o| o.flag.clone())
                .collect(),
        })
        .collect();

    // 4. Toolchain
    let toolchain = toolchain::decide(recipe, &ctx)?;

    // 5. Conflicts and variants
    if let Some(rule) = recipe.conflicts.iter().find(|c| c.when.eval(&ctx)) {
        return Err(BuildError::conflict(rule.detail.clone()));
    }

    let enabled: Vec<&Variant> = recipe
        .variants
        .iter()
        .filter(|v| holds(&v.when, &ctx))
        .collect();
    if enabled.is_empty() {
        let names: Vec<&str> = recipe.variants.iter().map(|v| v.name.as_str()).collect();
        return Err(BuildError::conflict(format!(
            "no variant is enabled; enable at least one of: {}",
            names.join(", ")
        )));
    }

    // 6. Environment and commands
    let jobs = options.jobs.max(1);
    let mut base = BTreeMap::new();
    base.insert("name".to_string(), template::escape(&recipe.name));
    base.insert("version".to_string(), template::escape(&recipe.version));
    base.insert("pkg_version".to_string(), template::escape(&recipe.pkg_version()));
    base.insert("jobs".to_string(), jobs.to_string());

    let env = resolve_env(recipe, options, &base, &ctx)?;

    let mut prepare = Vec::new();
    for (i, cmd) in recipe.build.prepare.iter().enumerate() {
        if holds(&cmd.when, &ctx) {
            prepare.push(substitute_all(&cmd.argv, &base, &format!("build.prepare[{}]", i))?);
        }
    }

    let variants = enabled
        .into_iter()
        .map(|v| resolve_variant(recipe, v, &base, &ctx))
        .collect::<BuildResult<Vec<_>>>()?;

    tracing::debug!(
        "resolved {} {} with {} variant(s)",
        recipe.name,
        recipe.pkg_version(),
        variants.len()
    );

    Ok(ResolvedConfig {
        name: recipe.name.clone(),
        version: recipe.version.clone(),
        pkg_version: recipe.pkg_version(),
        channel,
        source,
        patches,
        options: values.clone(),
        dependencies,
        toolchain,
        jobs,
        env,
        prepare,
        variants,
    })
}

fn resolve_env(
    recipe: &Recipe,
    options: &BuildOptions,
    base: &BTreeMap<String, String>,
    ctx: &EvalContext<'_>,
) -> BuildResult<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    for (name, flags) in [
        ("CFLAGS", &options.cflags),
        ("CXXFLAGS", &options.cxxflags),
        ("LDFLAGS", &options.ldflags),
    ] {
        if !flags.is_empty() {
            env.insert(name.to_string(), template::escape(&flags.join(" ")));
        }
    }

    for (i, tweak) in recipe.env.iter().enumerate() {
        if !holds(&tweak.when, ctx) {
            continue;
        }
        let field = format!("env[{}]", i);
        let value = template::substitute(&tweak.value, base, PLAN_PLACEHOLDERS)
            .map_err(malformed_template(&field))?;
        match tweak.mode {
            EnvMode::Set => {
                env.insert(tweak.name.clone(), value);
            }
            EnvMode::Append => {
                env.entry(tweak.name.clone())
                    .and_modify(|existing: &mut String| {
                        if !existing.is_empty() {
                            existing.push(' ');
                        }
                        existing.push_str(&value);
                    })
                    .or_insert(value);
            }
        }
    }
    Ok(env)
}

fn resolve_variant(
    recipe: &Recipe,
    variant: &Variant,
    base: &BTreeMap<String, String>,
    ctx: &EvalContext<'_>,
) -> BuildResult<ResolvedVariant> {
    let field = format!("variant.{}", variant.name);

    let mut fragments = base.clone();
    fragments.insert("variant".to_string(), template::escape(&variant.name));

    let mut vars = BTreeMap::new();
    for (key, value) in &variant.vars {
        let expanded = template::substitute(value, &fragments, PLAN_PLACEHOLDERS)
            .map_err(malformed_template(&field))?;
        vars.insert(key.clone(), expanded);
    }
    fragments.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));

    let configure = match recipe.build.configure {
        Some(ref command) => {
            let argv: Vec<String> = command
                .iter()
                .chain(active_args(&recipe.build.configure_args, ctx))
                .chain(active_args(&variant.configure_args, ctx))
                .cloned()
                .collect();
            Some(substitute_all(&argv, &fragments, &format!("{}.configure", field))?)
        }
        None => None,
    };

    let compile = recipe
        .build
        .compile
        .as_ref()
        .map(|argv| substitute_all(argv, &fragments, "build.compile"))
        .transpose()?;
    let install = substitute_all(&recipe.build.install, &fragments, "build.install")?;

    let mut env = BTreeMap::new();
    for (key, value) in &variant.env {
        let expanded = template::substitute(value, &fragments, PLAN_PLACEHOLDERS)
            .map_err(malformed_template(&field))?;
        env.insert(key.clone(), expanded);
    }

    let mut edits = Vec::with_capacity(variant.edits.len());
    for edit in &variant.edits {
        edits.push(SourceEdit {
            file: edit.file.clone(),
            from: template::substitute(&edit.from, &fragments, PLAN_PLACEHOLDERS)
                .map_err(malformed_template(&field))?,
            to: template::substitute(&edit.to, &fragments, PLAN_PLACEHOLDERS)
                .map_err(malformed_template(&field))?,
        });
    }

    let test = match recipe.test {
        Some(ref test) => {
            let mut test_env = BTreeMap::new();
            for (key, value) in &test.env {
                let expanded = template::substitute(value, &fragments, PLAN_PLACEHOLDERS)
                    .map_err(malformed_template("test.env"))?;
                test_env.insert(key.clone(), expanded);
            }
            Some(ResolvedTest {
                files: test.files.clone(),
                run: substitute_all(&test.run, &fragments, "test.run")?,
                env: test_env,
            })
        }
        None => None,
    };

    Ok(ResolvedVariant {
        name: variant.name.clone(),
        vars,
        env,
        edits,
        configure,
        compile,
        install,
        test,
    })
}
