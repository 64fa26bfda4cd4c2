//! Logging setup.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Parse the configured level name.
pub fn parse_level(name: &str) -> Result<Level> {
    name.trim()
        .parse::<Level>()
        .map_err(|_| anyhow::anyhow!("unknown log level: {}", name))
}

/// Install the global `tracing` subscriber described by `config`.
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
/// Fails instead of panicking when a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level = parse_level(&config.level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}
