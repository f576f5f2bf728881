//! Command implementations

pub mod build;
pub mod completions;
pub mod host;
pub mod info;
pub mod plan;
pub mod resolve;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::cli::{GlobalArgs, RecipeArgs};
use cellar::core::host::{FileHost, HostFactsProvider, SystemHost};
use cellar::core::options::{default_jobs, BuildOptions};
use cellar::ops::BuildRequest;
use cellar::sources::CacheFetcher;
use cellar::util::GlobalContext;

/// Global context with the command-line flags applied.
pub fn context(global: &GlobalArgs) -> Result<GlobalContext> {
    let mut gctx = GlobalContext::new()?;
    gctx.set_verbose(global.verbose);
    gctx.set_color(!global.no_color);
    Ok(gctx)
}

/// Build options from `--with`/`--without`/`--head`/`--jobs`.
///
/// Jobs: CLI > config > available parallelism.
pub fn build_options(gctx: &GlobalContext, args: &RecipeArgs) -> Result<BuildOptions> {
    let flags: Vec<String> = args
        .with
        .iter()
        .map(|o| format!("with-{}", o))
        .chain(args.without.iter().map(|o| format!("without-{}", o)))
        .collect();

    let toolchain = &gctx.config().toolchain;
    let mut options = BuildOptions::from_flags(&flags)?
        .with_head(args.head)
        .with_jobs(
            args.jobs
                .or(gctx.config().build.jobs)
                .unwrap_or_else(default_jobs),
        );
    options.cflags = toolchain.cflags.clone();
    options.cxxflags = toolchain.cxxflags.clone();
    options.ldflags = toolchain.ldflags.clone();
    Ok(options)
}

pub fn build_request(gctx: &GlobalContext, args: &RecipeArgs) -> Result<BuildRequest> {
    Ok(BuildRequest {
        recipe: args.recipe.clone(),
        options: build_options(gctx, args)?,
        parallel: gctx.config().build.parallel_variants,
        skip_test: false,
        keep_work: gctx.config().build.keep_work,
        install_root: args.install_root.clone(),
    })
}

/// Host facts from `--host`, or probed from the system.
pub fn host_provider(gctx: &GlobalContext, host: Option<&Path>) -> Box<dyn HostFactsProvider> {
    match host {
        Some(path) => Box::new(FileHost::new(gctx.resolve_path(path))),
        None => Box::new(SystemHost::new(gctx.config().toolchain.clone())),
    }
}

/// Directory a recipe's relative source paths are resolved against.
pub fn recipe_root(gctx: &GlobalContext, recipe: &Path) -> PathBuf {
    gctx.resolve_path(recipe)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| gctx.cwd().to_path_buf())
}

pub fn cache_fetcher(gctx: &GlobalContext, recipe: &Path) -> CacheFetcher {
    CacheFetcher::new(gctx.cache_dir())
        .with_root(recipe_root(gctx, recipe))
        .offline(gctx.config().net.offline)
}
