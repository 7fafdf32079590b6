use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use client_sync::config::Config;
use client_sync::server::open_backend;
use client_sync::state::Schema;
use client_sync::sync::SessionHub;
use commands::{DiffCommand, MergeCommand, SessionCommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "client-sync")]
#[command(version)]
#[command(about = "Delta codec and session inspection for client state sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the delta turning one text into another
    Diff(DiffCommand),

    /// Apply a delta to a text
    Merge(MergeCommand),

    /// Inspect and manage stored sessions
    Session(SessionCommand),

    /// Remove expired sessions
    Purge,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "client_sync=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn open_hub(config: &Config) -> Result<SessionHub, Box<dyn std::error::Error>> {
    let backend = open_backend(config).await?;
    Ok(SessionHub::from_config(backend, Schema::default(), config))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Diff(cmd)) => {
            cmd.run()?;
        }
        Some(Commands::Merge(cmd)) => {
            cmd.run()?;
        }
        Some(Commands::Session(cmd)) => {
            let config = Config::load(cli.config)?;
            let hub = open_hub(&config).await?;
            cmd.run(&hub).await?;
        }
        Some(Commands::Purge) => {
            let config = Config::load(cli.config)?;
            let hub = open_hub(&config).await?;
            let purged = hub.purge_expired().await?;
            println!("Purged {} expired session(s)", purged);
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
