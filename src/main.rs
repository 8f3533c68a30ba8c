//! Overseer CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use overseer::application::QualitySystem;
use overseer::cli::{Cli, Commands};
use overseer::infrastructure::config::ConfigLoader;
use overseer::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli.command, cli.config, json).await {
        overseer::cli::handle_error(&err, json);
    }
}

async fn run(command: Commands, config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config = match config_path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;

    let system = QualitySystem::open(&config)
        .await
        .with_context(|| format!("Failed to open analytics in {}", config.storage.data_dir))?;
    overseer::cli::commands::execute(command, &system, json).await
}
