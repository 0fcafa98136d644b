mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "redux", about = "Recipe-driven IFU data reduction")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reduce the frames listed in a manifest
    Run(commands::run::RunArgs),
    /// Print or save the default configuration
    Config(commands::config::ConfigArgs),
    /// Show the recipe graph
    Graph(commands::graph::GraphArgs),
    /// Inspect a processing ledger
    Ledger(commands::ledger::LedgerArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Graph(args) => commands::graph::run(args),
        Commands::Ledger(args) => commands::ledger::run(args),
    }
}
