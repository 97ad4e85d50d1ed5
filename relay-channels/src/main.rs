//! Relay server - Main entry point.

use anyhow::{Context, Result};
use relay_channels::start_server;
use relay_common::config::Config;
use relay_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (.env, config file, environment overrides)
    let config = Config::load_with_env().context("failed to load configuration")?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Relay server v{}", env!("CARGO_PKG_VERSION"));

    // Refuse to start without a key
    config.require_openai_key()?;

    start_server(&config).await
}
