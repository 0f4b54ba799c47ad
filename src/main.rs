//! # relalg-opt
//!
//! Command-line front end for the plan optimizer.
//!
//! ## Usage
//!
//! ```bash
//! # Optimize with the configured phase sequence, print the result as JSON
//! relalg-opt optimize plan.json
//!
//! # Run only join pushdown and column pruning, write the plan to a file
//! relalg-opt optimize plan.json --phases JI --output out.json
//!
//! # Show a plan as an indented operator tree
//! relalg-opt print plan.json
//!
//! # List the phase letters
//! relalg-opt phases
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relalg_opt::algebra::print;
use relalg_opt::logging::{init_tracing, TraceSettings};
use relalg_opt::{Config, Optimizer, Phase, Plan};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "relalg-opt", version, about = "Rewrite relational algebra plans")]
struct Cli {
    /// Configuration file (defaults to relalg.toml in the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Optimize a JSON plan
    Optimize {
        plan: PathBuf,
        /// Phase letters overriding the configured sequence
        #[arg(long)]
        phases: Option<String>,
        /// Write the optimized plan here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Print the optimized plan as a tree instead of JSON
        #[arg(long)]
        print: bool,
        /// Print per-phase statistics as JSON on stderr
        #[arg(long)]
        stats: bool,
    },
    /// Print a JSON plan as an operator tree
    Print { plan: PathBuf },
    /// List the available phases
    Phases,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    let settings = TraceSettings::from_env(&config.logging);
    let _guard = init_tracing(&settings).context("failed to initialize tracing")?;

    match cli.command {
        Command::Optimize {
            plan,
            phases,
            output,
            print: as_tree,
            stats,
        } => {
            let mut optimizer_config = config.optimizer;
            if let Some(phases) = phases {
                optimizer_config.phases = phases;
            }
            let (mut dag, root) = read_plan(&plan)?.load().context("invalid plan")?;
            let report = Optimizer::new(optimizer_config)
                .optimize(&mut dag, root)
                .context("optimization failed")?;
            if stats {
                eprintln!("{}", serde_json::to_string_pretty(&report)?);
            }

            let rendered = if as_tree {
                print::render(&dag, root)
            } else {
                Plan::capture(&dag, root)?.to_json()?
            };
            match output {
                Some(path) => std::fs::write(&path, rendered)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => println!("{rendered}"),
            }
        }
        Command::Print { plan } => {
            let (dag, root) = read_plan(&plan)?.load().context("invalid plan")?;
            println!("{}", print::render(&dag, root));
        }
        Command::Phases => {
            for phase in Phase::ALL {
                println!("{}  {:<14} {}", phase.letter(), phase.name(), phase.description());
            }
        }
    }
    Ok(())
}

fn read_plan(path: &Path) -> Result<Plan> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Plan::from_json(&text).with_context(|| format!("failed to parse {}", path.display()))
}
