//! `cellar plan` command
//!
//! Shows every step a build would run, in order, without fetching or
//! running anything.

use anyhow::Result;

use crate::cli::{GlobalArgs, PlanArgs};
use crate::commands::{build_request, cache_fetcher, context, host_provider};
use cellar::ops::plan_request;

pub fn execute(args: PlanArgs, global: &GlobalArgs) -> Result<()> {
    let gctx = context(global)?;
    let request = build_request(&gctx, &args.recipe)?;
    let host = host_provider(&gctx, args.recipe.host.as_deref());
    let cache = cache_fetcher(&gctx, &args.recipe.recipe);

    let (config, plan) = plan_request(&gctx, &request, &*host, &cache)?;

    if args.json {
        println!("{}", plan.to_json_pretty());
        return Ok(());
    }

    println!(
        "{} ({} source, {})",
        plan.package_id(),
        config.channel,
        config.toolchain.label()
    );
    for step in plan.steps() {
        println!("{:>3}. {:<28} {}", step.index, step.label, step.describe());
        if gctx.is_verbose() {
            println!("     in {}", step.cwd().display());
        }
    }
    for variant in &plan.variants {
        println!("prefix [{}]: {}", variant.name, variant.prefix.display());
    }

    Ok(())
}
