//! `cellar info` command

use anyhow::Result;

use crate::cli::{GlobalArgs, InfoArgs};
use crate::commands::context;
use cellar::core::predicate::Predicate;
use cellar::core::recipe::{ConstraintAction, Recipe};

fn when(predicate: &Option<Predicate>) -> String {
    match predicate {
        Some(p) => format!(" (when {})", p),
        None => String::new(),
    }
}

pub fn execute(args: InfoArgs, global: &GlobalArgs) -> Result<()> {
    let gctx = context(global)?;
    let recipe = Recipe::load(&gctx.resolve_path(&args.recipe))?;

    match recipe.desc {
        Some(ref desc) => println!("{} {}: {}", recipe.name, recipe.pkg_version(), desc),
        None => println!("{} {}", recipe.name, recipe.pkg_version()),
    }
    if let Some(ref homepage) = recipe.homepage {
        println!("{}", homepage);
    }

    println!("\nSources:");
    for source in &recipe.sources {
        match source.revision {
            Some(ref rev) => println!("  {:<7} {} (revision {})", source.channel.to_string(), source.url, rev),
            None => println!("  {:<7} {}", source.channel.to_string(), source.url),
        }
    }
    if !recipe.patches.is_empty() {
        println!("\nPatches:");
        for patch in &recipe.patches {
            println!("  -p{} {}{}", patch.strip, patch.url, when(&patch.when));
        }
    }

    if !recipe.options.is_empty() {
        println!("\nOptions:");
        for option in &recipe.options {
            let default = if option.default { "on" } else { "off" };
            let description = match option.dependency {
                Some(ref dep) if option.description.is_empty() => format!("Use {}", dep),
                _ => option.description.clone(),
            };
            println!("  {:<20} {} (default: {})", option.name, description, default);
        }
    }

    if !recipe.dependencies.is_empty() {
        println!("\nDependencies:");
        for dep in &recipe.dependencies {
            let mut tags = vec![dep.tier.as_str()];
            if dep.build {
                tags.push("build");
            }
            println!("  {} [{}]{}", dep.name, tags.join(", "), when(&dep.when));
        }
    }

    if !recipe.toolchain.is_empty() {
        println!("\nToolchain:");
        for rule in &recipe.toolchain {
            let action = match rule.action {
                ConstraintAction::Reject => "rejects",
                ConstraintAction::Accept => "accepts",
            };
            println!("  {} {}{}", action, rule.describe(), when(&rule.when));
            if let Some(ref cause) = rule.cause {
                println!("      {}", cause);
            }
        }
    }

    if recipe.has_declared_variants() {
        println!("\nVariants:");
        for variant in &recipe.variants {
            println!("  {}{}", variant.name, when(&variant.when));
        }
    }

    Ok(())
}
