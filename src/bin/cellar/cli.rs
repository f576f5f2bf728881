//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Cellar - resolve and build declarative source-package recipes
#[derive(Parser)]
#[command(name = "cellar")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every subcommand.
#[derive(Args, Debug, Clone, Copy)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch, patch, configure, compile, install and test a recipe
    Build(BuildArgs),

    /// Print the resolved configuration as JSON
    Resolve(ResolveArgs),

    /// Show the build steps without running them
    Plan(PlanArgs),

    /// Show a recipe's options, dependencies and variants
    Info(InfoArgs),

    /// Rerun the smoke tests against an existing install
    Test(TestArgs),

    /// Show the detected host facts
    Host(HostArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Recipe selection and build options shared by resolving commands.
#[derive(Args, Debug, Clone)]
pub struct RecipeArgs {
    /// Path to the recipe file
    pub recipe: PathBuf,

    /// Enable an option (repeatable, or comma separated)
    #[arg(long = "with", value_name = "OPTION", value_delimiter = ',')]
    pub with: Vec<String>,

    /// Disable an option (repeatable, or comma separated)
    #[arg(long = "without", value_name = "OPTION", value_delimiter = ',')]
    pub without: Vec<String>,

    /// Build from the head source instead of the stable release
    #[arg(long)]
    pub head: bool,

    /// Number of parallel jobs substituted for `{jobs}`
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Read host facts from a TOML file instead of probing the system
    #[arg(long, value_name = "FILE", env = "CELLAR_HOST")]
    pub host: Option<PathBuf>,

    /// Root under which install prefixes are created
    #[arg(long, value_name = "DIR")]
    pub install_root: Option<PathBuf>,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    /// Build variants concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Skip the post-install smoke test
    #[arg(long)]
    pub skip_test: bool,

    /// Keep the working directory after a successful build
    #[arg(long)]
    pub keep_work: bool,

    /// Never download; use only cached artifacts
    #[arg(long)]
    pub offline: bool,

    /// Output format for build progress
    #[arg(long, value_enum, default_value = "human")]
    pub message_format: MessageFormatArg,
}

#[derive(Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    /// Print only the configuration fingerprint
    #[arg(long)]
    pub fingerprint: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    /// Emit the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Path to the recipe file
    pub recipe: PathBuf,
}

#[derive(Args)]
pub struct TestArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,
}

#[derive(Args)]
pub struct HostArgs {
    /// Read host facts from a TOML file instead of probing the system
    #[arg(long, value_name = "FILE", env = "CELLAR_HOST")]
    pub host: Option<PathBuf>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageFormatArg {
    Human,
    Json,
}
