//! mastomend CLI — the main entry point.
//!
//! Commands:
//! - `run`     — Connect to the stream and start replying
//! - `doctor`  — Check credentials, config, and connectivity
//! - `onboard` — Write a default config file
//!
//! Exit codes: 0 on a clean shutdown, 2 when configuration or
//! credentials are unusable at startup, 1 when the bot dies at runtime.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "mastomend",
    about = "mastomend — a supportive LLM reply bot for the fediverse",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the streaming API and start replying
    Run {
        /// Use this config file instead of searching the default paths
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check credentials, config file, and API connectivity
    Doctor,

    /// Write a default config file
    Onboard {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Pick up a local .env before reading credentials.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run { config } => commands::run::run(config.as_deref()).await,
        Commands::Doctor => commands::doctor::run().await,
        Commands::Onboard { force } => commands::onboard::run(force),
    }
}
