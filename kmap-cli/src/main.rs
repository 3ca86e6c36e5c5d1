use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "kmap", about = "Knowledge-map validation analysis and recovery")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file layered over the user and project configs
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect recurring issue patterns in a validation history file
    Analyze(commands::analyze::AnalyzeArgs),
    /// Recommend a recovery action for a failed validation
    Recommend(commands::recommend::RecommendArgs),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let explicit = cli.config.as_deref();
    match cli.command {
        Commands::Analyze(args) => commands::analyze::run(args, explicit).await,
        Commands::Recommend(args) => commands::recommend::run(args, explicit).await,
        Commands::Config(args) => commands::config::run(args, explicit),
    }
}
