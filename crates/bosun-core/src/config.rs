//! Runtime configuration for the status pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::home_dir;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Complete status pipeline configuration.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Status bus and change feed sizing
    pub bus: BusConfig,
    /// Live list retention and sweep cadence
    pub aggregator: AggregatorConfig,
    /// Cooperative cancellation tuning
    pub cancellation: CancellationConfig,
}

/// Channel sizing for the bus and per-task change feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Events buffered per bus subscriber before it starts lagging
    pub capacity: usize,
    /// Changes buffered per change feed subscriber before it starts lagging
    pub change_feed_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            change_feed_capacity: 256,
        }
    }
}

/// Live list retention and sweep cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Seconds a completed, unpinned task stays in the live list
    pub completed_retention_secs: u64,
    /// Milliseconds between eviction sweeps
    pub sweep_interval_ms: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            completed_retention_secs: 30,
            sweep_interval_ms: 1000,
        }
    }
}

impl AggregatorConfig {
    /// How long a completed, unpinned task stays listed before eviction.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.completed_retention_secs)
    }

    /// Time between eviction sweeps. An interval of zero is treated as one
    /// millisecond.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

/// Cooperative cancellation tuning.
///
/// Cancellation carries no enforced latency bound: a worker only notices a
/// request at its own checkpoints between items, so the real bound is
/// however long one item takes. The interval here is the advisory pacing
/// workers use between checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationConfig {
    /// Milliseconds between worker cancellation checkpoints
    pub poll_interval_ms: u64,
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
        }
    }
}

impl CancellationConfig {
    /// Advisory pacing between worker cancellation checkpoints.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl StatusConfig {
    /// Get the default config directory path (`~/.bosun`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home = home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".bosun"))
    }

    /// Get the default config file path (`~/.bosun/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location (`~/.bosun/config.toml`)
    /// If the config doesn't exist, creates it with default values
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("Failed to read config: {error}")))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|error| Error::Config(format!("Failed to parse config: {error}")))?;

        debug!(
            "Loaded config from {:?}: retention={}s, sweep={}ms, cancel_poll={}ms",
            path,
            config.aggregator.completed_retention_secs,
            config.aggregator.sweep_interval_ms,
            config.cancellation.poll_interval_ms
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|error| Error::Config(format!("Failed to serialize config: {error}")))?;

        let header = "# Bosun Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| Error::Config(format!("Failed to write config: {error}")))?;

        Ok(())
    }
}
