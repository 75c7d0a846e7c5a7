// src/main.rs
// slunk — desktop conversation harvester CLI entry point

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use slunk::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env from ~/.slunk/.env only (never from CWD).
    if let Some(home) = dirs::home_dir()
        && let Err(e) = dotenvy::from_path(home.join(".slunk/.env"))
    {
        tracing::debug!("no global .env file loaded: {}", e);
    }

    let cli = Cli::parse();

    let log_level = match &cli.command {
        Some(Commands::Ingest { .. }) => Level::INFO,
        Some(Commands::Query { .. }) => Level::WARN,
        Some(Commands::HashStoreGc) => Level::INFO,
        Some(Commands::Serve) | None => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    slunk::cli::run(cli).await?;
    Ok(())
}
