//! Build plan generation.
//!
//! A BuildPlan lays out every step of a build in execution order:
//!
//! ```text
//! unpack -> patch* -> prepare*                      (shared source tree)
//!        -> for each variant:
//!             stage -> edit* -> configure -> compile -> install
//! ```
//!
//! Source checksums are verified by the fetcher before a plan exists. Each
//! variant works on a private copy of the patched tree and installs into
//! its own prefix, so variants never share a directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::builder::command::CommandSpec;
use crate::core::errors::{BuildError, BuildResult};
use crate::core::template;
use crate::resolver::{ResolvedConfig, ResolvedVariant};
use crate::sources::FetchedSources;

/// Directory layout for one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildLayout {
    /// Scratch directory owned by this build
    pub work_dir: PathBuf,
    /// Root under which install prefixes are created
    pub install_root: PathBuf,
}

impl BuildLayout {
    pub fn new(work_dir: impl Into<PathBuf>, install_root: impl Into<PathBuf>) -> Self {
        BuildLayout {
            work_dir: work_dir.into(),
            install_root: install_root.into(),
        }
    }

    /// The shared, patched source tree.
    pub fn source_dir(&self) -> PathBuf {
        self.work_dir.join("src")
    }

    pub fn variant_dir(&self, variant: &str) -> PathBuf {
        self.work_dir.join("variants").join(variant)
    }

    /// A variant's private copy of the source tree.
    pub fn variant_source_dir(&self, variant: &str) -> PathBuf {
        self.variant_dir(variant).join("src")
    }

    /// Install prefix: `<install_root>/<name>/<pkg_version>/<variant>`.
    pub fn prefix(&self, name: &str, pkg_version: &str, variant: &str) -> PathBuf {
        self.install_root.join(name).join(pkg_version).join(variant)
    }
}

/// Kind of step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Unpack,
    Patch,
    Prepare,
    Stage,
    Edit,
    Configure,
    Compile,
    Install,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Unpack => "unpack",
            StepKind::Patch => "patch",
            StepKind::Prepare => "prepare",
            StepKind::Stage => "stage",
            StepKind::Edit => "edit",
            StepKind::Configure => "configure",
            StepKind::Compile => "compile",
            StepKind::Install => "install",
        }
    }

    /// Status verb for human output.
    pub fn verb(&self) -> &'static str {
        match self {
            StepKind::Unpack => "Unpacking",
            StepKind::Patch => "Patching",
            StepKind::Prepare => "Preparing",
            StepKind::Stage => "Staging",
            StepKind::Edit => "Editing",
            StepKind::Configure => "Configuring",
            StepKind::Compile => "Compiling",
            StepKind::Install => "Installing",
        }
    }
}

/// What a step does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// Run an external process
    Run(CommandSpec),
    /// Replace `to` with a copy of `from`
    Stage { from: PathBuf, to: PathBuf },
    /// Replace every occurrence of `from` with `to` in `file`
    Edit {
        file: PathBuf,
        from: String,
        to: String,
    },
}

/// A build step in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStep {
    /// 1-based position in the whole plan
    pub index: usize,
    pub kind: StepKind,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub action: StepAction,
}

impl BuildStep {
    /// Directory the step operates in.
    pub fn cwd(&self) -> &Path {
        match self.action {
            StepAction::Run(ref cmd) => &cmd.cwd,
            StepAction::Stage { ref to, .. } => to,
            StepAction::Edit { ref file, .. } => file.parent().unwrap_or(Path::new(".")),
        }
    }

    /// One-line description of the action.
    pub fn describe(&self) -> String {
        match self.action {
            StepAction::Run(ref cmd) => cmd.display(),
            StepAction::Stage { ref from, ref to } => {
                format!("copy {} -> {}", from.display(), to.display())
            }
            StepAction::Edit {
                ref file,
                ref from,
                ref to,
            } => format!("replace `{}` with `{}` in {}", from, to, file.display()),
        }
    }
}

/// Smoke test with every placeholder rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifySpec {
    pub files: BTreeMap<String, String>,
    pub run: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Steps and locations for one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantPlan {
    pub name: String,
    pub prefix: PathBuf,
    pub source_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub steps: Vec<BuildStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<VerifySpec>,
}

/// A complete build plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    pub package: String,
    pub pkg_version: String,
    pub layout: BuildLayout,
    /// Steps on the shared source tree, run before any variant
    pub shared: Vec<BuildStep>,
    pub variants: Vec<VariantPlan>,
}

/// Assigns ordinals and renders plan-time placeholders.
struct Planner {
    next_index: usize,
}

impl Planner {
    fn step(
        &mut self,
        kind: StepKind,
        label: String,
        variant: Option<&str>,
        action: StepAction,
    ) -> BuildStep {
        self.next_index += 1;
        BuildStep {
            index: self.next_index,
            kind,
            label,
            variant: variant.map(String::from),
            action,
        }
    }
}

fn path_value(path: &Path) -> String {
    path.display().to_string()
}

fn render(text: &str, values: &BTreeMap<String, String>, field: &str) -> BuildResult<String> {
    template::render(text, values).map_err(|e| BuildError::malformed(field, e.to_string()))
}

fn render_all(argv: &[String], values: &BTreeMap<String, String>, field: &str) -> BuildResult<Vec<String>> {
    argv.iter().map(|a| render(a, values, field)).collect()
}

fn render_map(
    map: &BTreeMap<String, String>,
    values: &BTreeMap<String, String>,
    field: &str,
) -> BuildResult<BTreeMap<String, String>> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), render(v, values, field)?)))
        .collect()
}

fn command(argv: Vec<String>, cwd: &Path, env: &BTreeMap<String, String>, field: &str) -> BuildResult<CommandSpec> {
    CommandSpec::from_argv(&argv, cwd)
        .map(|cmd| cmd.envs(env))
        .ok_or_else(|| BuildError::malformed(field, "empty command"))
}

/// File name shown in patch step labels.
fn short_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl BuildPlan {
    /// Lay out the build for a resolved configuration and verified artifacts.
    pub fn new(
        config: &ResolvedConfig,
        fetched: &FetchedSources,
        layout: &BuildLayout,
    ) -> BuildResult<Self> {
        if fetched.patches.len() != config.patches.len() {
            return Err(BuildError::io(
                "build plan",
                format!(
                    "{} patches resolved but {} fetched",
                    config.patches.len(),
                    fetched.patches.len()
                ),
            ));
        }

        let mut planner = Planner { next_index: 0 };
        let source_dir = layout.source_dir();

        let mut shared_values = BTreeMap::new();
        shared_values.insert("srcdir".to_string(), path_value(&source_dir));
        let shared_env = render_map(&config.env, &shared_values, "env")?;

        let mut shared = Vec::new();

        let unpack = CommandSpec::new("tar", &source_dir)
            .arg("-xf")
            .arg(path_value(&fetched.source.path))
            .arg("--strip-components=1")
            .envs(&shared_env);
        shared.push(planner.step(
            StepKind::Unpack,
            format!("unpack {}", short_name(&fetched.source.path)),
            None,
            StepAction::Run(unpack),
        ));

        for (patch, artifact) in config.patches.iter().zip(&fetched.patches) {
            let cmd = CommandSpec::new("patch", &source_dir)
                .arg(format!("-p{}", patch.strip))
                .arg("-i")
                .arg(path_value(&artifact.path))
                .envs(&shared_env);
            shared.push(planner.step(
                StepKind::Patch,
                format!("patch {}", short_name(&artifact.path)),
                None,
                StepAction::Run(cmd),
            ));
        }

        for (i, argv) in config.prepare.iter().enumerate() {
            let field = format!("build.prepare[{}]", i);
            let argv = render_all(argv, &shared_values, &field)?;
            let label = format!("prepare {}", argv.join(" "));
            let cmd = command(argv, &source_dir, &shared_env, &field)?;
            shared.push(planner.step(StepKind::Prepare, label, None, StepAction::Run(cmd)));
        }

        let variants = config
            .variants
            .iter()
            .map(|v| plan_variant(&mut planner, config, v, layout, &source_dir))
            .collect::<BuildResult<Vec<_>>>()?;

        Ok(BuildPlan {
            package: config.name.clone(),
            pkg_version: config.pkg_version.clone(),
            layout: layout.clone(),
            shared,
            variants,
        })
    }

    /// All steps in ordinal order.
    pub fn steps(&self) -> impl Iterator<Item = &BuildStep> {
        self.shared
            .iter()
            .chain(self.variants.iter().flat_map(|v| v.steps.iter()))
    }

    pub fn len(&self) -> usize {
        self.shared.len() + self.variants.iter().map(|v| v.steps.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn step(&self, index: usize) -> Option<&BuildStep> {
        self.steps().find(|s| s.index == index)
    }

    pub fn variant(&self, name: &str) -> Option<&VariantPlan> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Package identifier shown in progress output.
    pub fn package_id(&self) -> String {
        format!("{} {}", self.package, self.pkg_version)
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

fn plan_variant(
    planner: &mut Planner,
    config: &ResolvedConfig,
    variant: &ResolvedVariant,
    layout: &BuildLayout,
    shared_source: &Path,
) -> BuildResult<VariantPlan> {
    let name = variant.name.as_str();
    let field = format!("variant.{}", name);
    let prefix = layout.prefix(&config.name, &config.pkg_version, name);
    let source_dir = layout.variant_source_dir(name);

    let mut values = BTreeMap::new();
    values.insert("prefix".to_string(), path_value(&prefix));
    values.insert("srcdir".to_string(), path_value(&source_dir));

    let mut env = render_map(&config.env, &values, "env")?;
    env.extend(render_map(&variant.env, &values, &field)?);

    let label = |kind: StepKind| format!("{} [{}]", kind.as_str(), name);
    let mut steps = Vec::new();

    steps.push(planner.step(
        StepKind::Stage,
        label(StepKind::Stage),
        Some(name),
        StepAction::Stage {
            from: shared_source.to_path_buf(),
            to: source_dir.clone(),
        },
    ));

    for edit in &variant.edits {
        steps.push(planner.step(
            StepKind::Edit,
            format!("edit {} [{}]", edit.file, name),
            Some(name),
            StepAction::Edit {
                file: source_dir.join(&edit.file),
                from: render(&edit.from, &values, &field)?,
                to: render(&edit.to, &values, &field)?,
            },
        ));
    }

    let phases = [
        (StepKind::Configure, variant.configure.as_ref()),
        (StepKind::Compile, variant.compile.as_ref()),
        (StepKind::Install, Some(&variant.install)),
    ];
    for (kind, argv) in phases {
        let Some(argv) = argv else {
            continue;
        };
        let field = format!("{}.{}", field, kind.as_str());
        let argv = render_all(argv, &values, &field)?;
        let cmd = command(argv, &source_dir, &env, &field)?;
        steps.push(planner.step(kind, label(kind), Some(name), StepAction::Run(cmd)));
    }

    let test = match variant.test {
        Some(ref test) => Some(VerifySpec {
            files: test.files.clone(),
            run: render_all(&test.run, &values, "test.run")?,
            env: render_map(&test.env, &values, "test.env")?,
        }),
        None => None,
    };

    Ok(VariantPlan {
        name: name.to_string(),
        prefix,
        source_dir,
        env,
        steps,
        test,
    })
}
