use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod store;

use commands::{ConfigCommand, GetCommand, PutCommand, SyncCommand};
use config::Config;
use docgate_core::DatabaseCache;

#[derive(Parser)]
#[command(name = "docgate")]
#[command(version)]
#[command(about = "Validated bulk writes and replication for JSON document stores", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a batch of documents
    Put(PutCommand),

    /// Print one document
    Get(GetCommand),

    /// Replicate a database with the configured remote
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docgate=info,docgate_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;
    let databases = DatabaseCache::new();

    match cli.command {
        Some(Commands::Put(cmd)) => cmd.run(&config, &databases).await?,
        Some(Commands::Get(cmd)) => cmd.run(&config, &databases).await?,
        Some(Commands::Sync(cmd)) => cmd.run(&config, &databases).await?,
        Some(Commands::Config(cmd)) => cmd.run(&config)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
