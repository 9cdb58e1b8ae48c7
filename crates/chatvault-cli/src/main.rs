//! Chatvault - project-organised chat threads backed by SQLite.

use anyhow::Result;
use chatvault_cli::cli::Cli;
use chatvault_cli::config::Config;
use chatvault_cli::state::AppState;
use chatvault_cli::{commands, logging};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.logging.to_config())?;

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(db) = cli.db {
        config.db_path = db;
    }

    tracing::info!(target: "chatvault::startup", "Using database {}", config.db_path.display());

    let state = AppState::new(config)?;
    let mut out = std::io::stdout();

    if let Err(e) = commands::run(&state, cli.command, &mut out).await {
        tracing::debug!(target: "chatvault::startup", "Command failed: {:?}", e);
        return Err(e);
    }
    Ok(())
}
