//! claude-relay - transparent reverse proxy for Claude-style LLM APIs

#![allow(missing_docs)]

use clap::Parser;
use claude_relay::{RunOptions, server};
use std::path::PathBuf;
use std::process::ExitCode;

/// Transparent reverse proxy for Claude-style LLM APIs
#[derive(Parser, Debug)]
#[command(name = "claude-relay", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Promote the named endpoint to priority 1 for this run
    #[arg(short = 'p', value_name = "ENDPOINT")]
    promote: Option<String>,

    /// Enable the terminal dashboard (shipped separately)
    #[arg(long)]
    tui: bool,

    /// Disable the terminal dashboard
    #[arg(long = "no-tui", conflicts_with = "tui")]
    no_tui: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if cli.tui && !cli.no_tui {
        tracing::warn!("Terminal dashboard is not part of this build, continuing headless");
    }

    let options = RunOptions {
        config_path: cli.config,
        promote: cli.promote,
    };

    match server::builder::run_server(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
