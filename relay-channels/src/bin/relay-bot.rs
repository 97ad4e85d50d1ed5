//! Relay bot - single-session entry point with voice note support.

use anyhow::{Context, Result};
use relay_channels::start_bot;
use relay_common::config::Config;
use relay_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_with_env().context("failed to load configuration")?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Relay bot v{}", env!("CARGO_PKG_VERSION"));
    config.require_openai_key()?;

    start_bot(&config).await
}
