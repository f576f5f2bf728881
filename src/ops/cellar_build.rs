//! Implementation of `cellar build`.
//!
//! The build pipeline is:
//!
//! ```text
//! load recipe -> host facts -> resolve -> fetch + verify checksums
//!             -> plan -> execute -> smoke test
//! ```
//!
//! Everything up to and including checksum verification happens before any
//! external process runs.

use std::path::PathBuf;
use std::time::Instant;

use crate::builder::events::Reporter;
use crate::builder::executor::{BuildExecutor, BuildReport, CommandRunner};
use crate::builder::plan::{BuildLayout, BuildPlan};
use crate::core::errors::{BuildError, BuildResult};
use crate::core::host::{HostFacts, HostFactsProvider};
use crate::core::options::BuildOptions;
use crate::core::recipe::Recipe;
use crate::ops::verify::{verify, VerifyResult};
use crate::resolver::{resolve, ResolvedConfig};
use crate::sources::{fetch_all, CacheFetcher, Fetcher};
use crate::util::context::GlobalContext;
use crate::util::fs::remove_dir_all_if_exists;

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Path to the recipe file
    pub recipe: PathBuf,

    /// Requested options, channel and parallelism
    pub options: BuildOptions,

    /// Build variants concurrently
    pub parallel: bool,

    /// Skip the post-install smoke test
    pub skip_test: bool,

    /// Keep the working directory after a successful build
    pub keep_work: bool,

    /// Override for the install root
    pub install_root: Option<PathBuf>,
}

/// External collaborators used by a build.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub host: &'a dyn HostFactsProvider,
    pub fetcher: &'a dyn Fetcher,
    pub runner: &'a dyn CommandRunner,
}

/// Everything produced by a successful build.
#[derive(Debug)]
pub struct BuildOutcome {
    pub config: ResolvedConfig,
    pub plan: BuildPlan,
    pub report: BuildReport,
    pub tests: Vec<VerifyResult>,
}

/// Load the recipe named by a request.
pub fn load_recipe(gctx: &GlobalContext, request: &BuildRequest) -> BuildResult<Recipe> {
    let path = gctx.resolve_path(&request.recipe);
    tracing::debug!("loading recipe {}", path.display());
    Recipe::load(&path)
}

/// Take a snapshot of the host.
pub fn host_facts(host: &dyn HostFactsProvider) -> BuildResult<HostFacts> {
    host.host_facts()
        .map_err(|e| BuildError::io("failed to determine host facts", format!("{:#}", e)))
}

/// Load and resolve a recipe without touching the network or the disk
/// beyond reading the recipe.
pub fn resolve_request(
    gctx: &GlobalContext,
    request: &BuildRequest,
    host: &dyn HostFactsProvider,
) -> BuildResult<(Recipe, ResolvedConfig)> {
    let recipe = load_recipe(gctx, request)?;
    let facts = host_facts(host)?;
    let config = resolve(&recipe, &request.options, &facts)?;
    Ok((recipe, config))
}

/// Directory layout for a resolved build.
pub fn layout_for(
    gctx: &GlobalContext,
    request: &BuildRequest,
    config: &ResolvedConfig,
) -> BuildLayout {
    let work_dir = gctx
        .work_dir()
        .join(format!("{}-{}", config.name, config.pkg_version));
    let install_root = match request.install_root {
        Some(ref root) => gctx.resolve_path(root),
        None => gctx.install_root(),
    };
    BuildLayout::new(work_dir, install_root)
}

/// Resolve and lay out a build without fetching or running anything.
///
/// Artifact paths point at where the cache would hold them.
pub fn plan_request(
    gctx: &GlobalContext,
    request: &BuildRequest,
    host: &dyn HostFactsProvider,
    cache: &CacheFetcher,
) -> BuildResult<(ResolvedConfig, BuildPlan)> {
    let (_, config) = resolve_request(gctx, request, host)?;
    let layout = layout_for(gctx, request, &config);
    let plan = BuildPlan::new(&config, &cache.planned(&config), &layout)?;
    Ok((config, plan))
}

/// Build a recipe end to end.
pub fn build(
    gctx: &GlobalContext,
    request: &BuildRequest,
    collab: Collaborators<'_>,
    reporter: &mut Reporter,
) -> BuildResult<BuildOutcome> {
    let start = Instant::now();

    let (recipe, config) = resolve_request(gctx, request, collab.host)?;
    tracing::info!(
        "resolved {} {} ({})",
        recipe.name,
        config.pkg_version,
        config.toolchain.label()
    );

    let fetched = fetch_all(collab.fetcher, &config)?;

    let layout = layout_for(gctx, request, &config);
    remove_dir_all_if_exists(&layout.work_dir)
        .map_err(|e| BuildError::io("failed to clear working directory", format!("{:#}", e)))?;
    let plan = BuildPlan::new(&config, &fetched, &layout)?;

    let variants = plan.variants.iter().map(|v| v.name.clone()).collect();
    reporter.begin(&plan.package_id(), variants, plan.len());

    let report = BuildExecutor::new(collab.runner, reporter)
        .parallel(request.parallel)
        .execute(&plan);
    let steps_run = report.steps_run();
    let report = match report.into_result() {
        Ok(report) => report,
        Err(err) => {
            reporter.finish(false, start.elapsed(), steps_run);
            return Err(err);
        }
    };

    let tests = if request.skip_test {
        Vec::new()
    } else {
        match verify(collab.runner, &plan, reporter) {
            Ok(tests) => tests,
            Err(err) => {
                reporter.finish(false, start.elapsed(), steps_run);
                return Err(err);
            }
        }
    };

    if !request.keep_work {
        if let Err(e) = remove_dir_all_if_exists(&layout.work_dir) {
            tracing::warn!("failed to remove {}: {:#}", layout.work_dir.display(), e);
        }
    }

    reporter.finish(true, start.elapsed(), steps_run);

    Ok(BuildOutcome {
        config,
        plan,
        report,
        tests,
    })
}

/// Rerun the smoke tests against an existing install.
pub fn test_installed(
    gctx: &GlobalContext,
    request: &BuildRequest,
    host: &dyn HostFactsProvider,
    cache: &CacheFetcher,
    runner: &dyn CommandRunner,
    reporter: &Reporter,
) -> BuildResult<Vec<VerifyResult>> {
    let (_, plan) = plan_request(gctx, request, host, cache)?;

    if let Some(missing) = plan.variants.iter().find(|v| !v.prefix.is_dir()) {
        return Err(BuildError::io(
            format!("variant `{}` is not installed", missing.name),
            format!("{} does not exist", missing.prefix.display()),
        ));
    }

    verify(runner, &plan, reporter)
}
