mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::handlers;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "distro")]
#[command(version)]
#[command(about = "Deliver export payloads to MQTT destinations")]
struct Cli {
    /// Path to configuration file (default: <config dir>/distro/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish one payload to a configured destination
    ///
    /// Examples:
    ///   distro send --destination plant --data '{"reading":42}'
    ///   distro send --destination plant --file reading.bin --correlation-id 7f3a
    Send {
        /// Destination name from the configuration file
        #[arg(short, long)]
        destination: String,

        /// Payload text
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        data: Option<String>,

        /// Read the payload from a file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Correlation id attached to log lines
        #[arg(long)]
        correlation_id: Option<String>,
    },

    /// Validate configuration and load TLS material without connecting
    Check,

    /// List configured destinations
    Destinations {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Send {
            destination,
            data,
            file,
            correlation_id,
        } => {
            handlers::handle_send(cli.config, destination, data, file, correlation_id).await?;
        }
        Commands::Check => {
            handlers::handle_check(cli.config)?;
        }
        Commands::Destinations { json } => {
            handlers::handle_destinations(cli.config, json)?;
        }
    }

    Ok(())
}
