//! `cellar host` command
//!
//! Prints the host facts in the same TOML format `--host` reads, so a
//! detected snapshot can be saved and replayed.

use anyhow::{Context, Result};

use crate::cli::{GlobalArgs, HostArgs};
use crate::commands::{context, host_provider};

pub fn execute(args: HostArgs, global: &GlobalArgs) -> Result<()> {
    let gctx = context(global)?;
    let host = host_provider(&gctx, args.host.as_deref());

    let facts = host.host_facts()?;
    let text = toml::to_string_pretty(&facts).context("failed to serialize host facts")?;
    print!("{}", text);

    Ok(())
}
