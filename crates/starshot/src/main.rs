//! Starshot CLI - Resilient client for remote image predictions.
//!
//! Starshot sends a photo and a prompt to a hosted image model, retries
//! transient failures, fails over between CORS proxies, and polls slow jobs
//! until they finish or hit the hard timeout.
//!
//! # Usage
//!
//! ```bash
//! # Generate a selfie with a celebrity
//! starshot generate --image me.jpg --prompt "with Ada Lovelace" --save ./out
//!
//! # Check on a prediction
//! starshot status <id>
//!
//! # Inspect proxy health
//! starshot proxy list
//!
//! # View configuration
//! starshot config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Starshot - Resilient client for remote image predictions.
#[derive(Parser, Debug)]
#[command(name = "starshot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a prediction to completion and print the result
    Generate(cli::generate::GenerateArgs),

    /// Show the current state of a prediction
    Status(cli::predictions::PredictionArgs),

    /// Cancel a running prediction
    Cancel(cli::predictions::PredictionArgs),

    /// Inspect and reset proxy health
    Proxy(cli::proxy::ProxyArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match starshot_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `starshot config path`."
            );
            starshot_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Starshot v{}", starshot_core::VERSION);

    match cli.command {
        Commands::Generate(args) => cli::generate::execute(config, args).await,
        Commands::Status(args) => cli::predictions::status(config, args).await,
        Commands::Cancel(args) => cli::predictions::cancel(config, args).await,
        Commands::Proxy(args) => cli::proxy::execute(config, args).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
