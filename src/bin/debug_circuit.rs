//! Compile a JSON plan and print the resulting circuit.
//!
//! Usage: `deltaplan-debug <plan.json> [--incrementalize] [--format text|dot|json]`

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use deltaplan::{logging, primitives, Compiler, CompilerConfig, Plan};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Dot,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "deltaplan-debug")]
#[command(about = "Compile a relational plan into a dataflow circuit and print it")]
struct Args {
    /// JSON file holding the plan
    plan: Option<PathBuf>,

    /// Configuration file; defaults to deltaplan.toml and DELTAPLAN_* variables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Produce an incremental circuit
    #[arg(long)]
    incrementalize: bool,

    /// Skip the optimizer (incrementalization still runs)
    #[arg(long)]
    no_optimize: bool,

    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Print per-pass statistics to stderr
    #[arg(long)]
    stats: bool,

    /// List the runtime functions the primitive table can name, then exit
    #[arg(long)]
    list_primitives: bool,
}

fn load_config(args: &Args) -> Result<CompilerConfig> {
    let mut config = match &args.config {
        Some(path) => CompilerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => CompilerConfig::load().context("failed to load configuration")?,
    };
    if args.incrementalize {
        config.optimizer.incrementalize = true;
    }
    if args.no_optimize {
        config.optimizer.optimize = false;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    logging::init_tracing(&config.logging);

    if args.list_primitives {
        for function in primitives::specializations() {
            println!("{}: {}", function.name, function.result);
        }
        return Ok(());
    }

    let Some(path) = &args.plan else {
        bail!("no plan file given (see --help)");
    };
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let plan: Plan =
        serde_json::from_str(&text).with_context(|| format!("failed to parse plan {}", path.display()))?;

    let compiler = Compiler::new(config);
    let (circuit, stats) = compiler
        .compile_with_stats(&plan)
        .with_context(|| format!("failed to compile plan {}", plan.name))?;

    if args.stats {
        for pass in &stats.passes {
            eprintln!(
                "{:<22} {:>5} -> {:<5} {}",
                pass.pass,
                pass.operators_before,
                pass.operators_after,
                if pass.changed { "changed" } else { "" }
            );
        }
    }

    match args.format {
        OutputFormat::Text => print!("{circuit}"),
        OutputFormat::Dot => print!("{}", circuit.to_dot()?),
        OutputFormat::Json => println!("{}", circuit.to_json()?),
    }
    Ok(())
}
