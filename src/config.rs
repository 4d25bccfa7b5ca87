//! Engine configuration.
//!
//! Reads `pgroll-rs.toml` configuration files: the poll interval for the
//! concurrent-index retry loop, its retry budget, and the backfill batch
//! size. Layout follows the teacher's nested-struct-with-serde-defaults
//! `Config` in the original `config.rs` — one top-level struct, one
//! sub-struct per concern, each with a `Default` impl backed by free
//! `default_*` functions so TOML and `Default::default()` agree.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub backfill: BackfillConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaConfig {
    /// The managed namespace, e.g. `public`.
    #[serde(default = "default_schema_name")]
    pub name: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            name: default_schema_name(),
        }
    }
}

/// Settings for the concurrent-index creation retry loop (§5).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Tick interval, in milliseconds, for polling `pg_index.indisvalid`.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Number of `CREATE INDEX CONCURRENTLY` attempts before the action
    /// reports `ActionError::IndexCreation`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl IndexConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_retries: default_max_retries(),
        }
    }
}

/// Settings for the backfill collaborator's row-copy sweep.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackfillConfig {
    /// Rows copied per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_schema_name() -> String {
    "public".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    5
}

fn default_batch_size() -> u32 {
    1000
}

impl Config {
    /// Loads configuration from a TOML file, applying defaults for any
    /// absent section or field.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.index.max_retries == 0 {
            return Err(ConfigError::Validation(
                "index.max_retries must be at least 1".to_string(),
            ));
        }
        if self.backfill.batch_size == 0 {
            return Err(ConfigError::Validation(
                "backfill.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
