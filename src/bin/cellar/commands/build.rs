//! `cellar build` command

use anyhow::Result;

use crate::cli::{BuildArgs, GlobalArgs, MessageFormatArg};
use crate::commands::{build_request, cache_fetcher, context, host_provider};
use cellar::builder::{BuildEvent, MessageFormat, Reporter, SystemRunner};
use cellar::ops::{build, Collaborators};

pub fn execute(args: BuildArgs, global: &GlobalArgs) -> Result<()> {
    let gctx = context(global)?;

    let mut request = build_request(&gctx, &args.recipe)?;
    request.parallel |= args.parallel;
    request.skip_test = args.skip_test;
    request.keep_work |= args.keep_work;

    let format = match args.message_format {
        MessageFormatArg::Human => MessageFormat::Human,
        MessageFormatArg::Json => MessageFormat::Json,
    };

    let host = host_provider(&gctx, args.recipe.host.as_deref());
    let fetcher = cache_fetcher(&gctx, &args.recipe.recipe)
        .offline(args.offline || gctx.config().net.offline);
    let runner = SystemRunner;
    let collab = Collaborators {
        host: &*host,
        fetcher: &fetcher,
        runner: &runner,
    };

    let mut reporter = Reporter::new(format).verbose(gctx.is_verbose());
    let outcome = match build(&gctx, &request, collab, &mut reporter) {
        Ok(outcome) => outcome,
        Err(err) => {
            if format == MessageFormat::Json {
                println!("{}", BuildEvent::error(err.to_string()).to_json());
            }
            return Err(err.into());
        }
    };

    if format == MessageFormat::Human {
        for variant in &outcome.plan.variants {
            eprintln!(
                "   Installed {} [{}] -> {}",
                outcome.plan.package_id(),
                variant.name,
                variant.prefix.display()
            );
        }
        let runtime: Vec<&str> = outcome
            .config
            .runtime_dependencies()
            .map(|d| d.name.as_str())
            .collect();
        if !runtime.is_empty() {
            tracing::info!("runtime dependencies: {}", runtime.join(", "));
        }
    }

    Ok(())
}
