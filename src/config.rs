//! Configuration file handling.
//!
//! This module handles loading and validating configuration from
//! `.event-tally.toml` files.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".event-tally.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Aggregator settings.
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Pipeline channel settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Aggregator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Bound at which per-type counts saturate.
    ///
    /// Unset means counts only saturate at `u64::MAX`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u64>,
}

impl AggregatorConfig {
    /// The effective counter bound.
    pub fn effective_max_count(&self) -> u64 {
        self.max_count.unwrap_or(u64::MAX)
    }
}

/// Pipeline channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Capacity of the bounded channel feeding raw records to the aggregator.
    #[serde(default = "default_capacity")]
    pub input_capacity: usize,

    /// Capacity of the bounded channel carrying encoded snapshots to the sink.
    #[serde(default = "default_capacity")]
    pub output_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_capacity: default_capacity(),
            output_capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    64
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Maximum level: trace, debug, info, warn or error.
    #[serde(default = "default_level")]
    pub level: String,

    /// Include the event target (module path) in log lines.
    #[serde(default)]
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            with_target: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.event-tally.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Check settings that parse fine but cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.aggregator.max_count == Some(0) {
            bail!("aggregator.max_count must be at least 1");
        }

        if self.pipeline.input_capacity == 0 {
            bail!("pipeline.input_capacity must be at least 1");
        }

        if self.pipeline.output_capacity == 0 {
            bail!("pipeline.output_capacity must be at least 1");
        }

        crate::telemetry::parse_level(&self.logging.level)?;

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
