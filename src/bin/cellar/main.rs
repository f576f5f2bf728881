//! Cellar CLI - resolve and build declarative source-package recipes

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cellar::core::BuildError;
use cellar::util::diagnostic::emit;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let color = !cli.global.no_color;

    if let Err(e) = run(cli) {
        match e.downcast_ref::<BuildError>() {
            Some(err) => emit(&err.to_diagnostic(), color),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Set up logging
    let filter = if cli.global.verbose {
        EnvFilter::new("cellar=debug")
    } else {
        EnvFilter::new("cellar=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let global = cli.global;
    match cli.command {
        Commands::Build(args) => commands::build::execute(args, &global),
        Commands::Resolve(args) => commands::resolve::execute(args, &global),
        Commands::Plan(args) => commands::plan::execute(args, &global),
        Commands::Info(args) => commands::info::execute(args, &global),
        Commands::Test(args) => commands::test::execute(args, &global),
        Commands::Host(args) => commands::host::execute(args, &global),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
