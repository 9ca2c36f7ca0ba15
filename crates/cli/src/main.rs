//! Chorus CLI, the main entry point.
//!
//! Commands:
//! - `run`     Supervise every configured agent until Ctrl-C
//! - `check`   Validate the config and resolve each agent's provider
//! - `agents`  List configured agents
//! - `parse`   Run the protocol codec on a piece of model output

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "chorus",
    about = "Chorus: autonomous LLM agents in shared conversations",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.chorus/config.toml)
    #[arg(short, long, global = true, env = "CHORUS_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the supervisor and run all enabled agents
    Run,

    /// Validate configuration and credentials
    Check,

    /// List configured agents
    Agents,

    /// Parse model output into visible text and tool calls
    Parse {
        /// The raw text; `-` reads standard input
        text: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config_path = commands::config_path(cli.config);
    match cli.command {
        Commands::Run => commands::run::run(&config_path).await?,
        Commands::Check => commands::check::run(&config_path)?,
        Commands::Agents => commands::agents::run(&config_path)?,
        Commands::Parse { text, json } => commands::parse::run(&text, json)?,
    }

    Ok(())
}
