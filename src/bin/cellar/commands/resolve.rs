//! `cellar resolve` command

use anyhow::Result;

use crate::cli::{GlobalArgs, ResolveArgs};
use crate::commands::{build_request, context, host_provider};
use cellar::ops::resolve_request;

pub fn execute(args: ResolveArgs, global: &GlobalArgs) -> Result<()> {
    let gctx = context(global)?;
    let request = build_request(&gctx, &args.recipe)?;
    let host = host_provider(&gctx, args.recipe.host.as_deref());

    let (_, config) = resolve_request(&gctx, &request, &*host)?;

    if args.fingerprint {
        println!("{}", config.fingerprint());
    } else {
        println!("{}", config.to_json_pretty());
    }

    Ok(())
}
