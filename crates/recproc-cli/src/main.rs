//! recproc CLI
//!
//! Runs a configured transformer over a JSON array of records.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// recproc - pipe record batches through processes and scripts
#[derive(Parser)]
#[command(name = "recproc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file or directory containing recproc.yaml
    #[arg(short, long, default_value = "recproc.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform one batch of records
    Run {
        /// File holding a JSON array of records (defaults to stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Where to write the resulting JSON array (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Load the configuration and construct the transformer without running it
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for records
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Run {
            input,
            output,
            pretty,
        } => {
            commands::run::run(&cli.config, input.as_deref(), output.as_deref(), pretty).await?;
        }
        Commands::Validate => {
            commands::validate::run(&cli.config).await?;
        }
    }

    Ok(())
}
