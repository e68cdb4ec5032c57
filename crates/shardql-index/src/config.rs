//! TOML-file configuration for the shard core (§6): `MaxShards`, `DataDir`,
//! and the per-shard batch-commit defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::shard::BatchConfig;

/// Top-level configuration recognized by the shard core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub data_dir: PathBuf,
    pub max_shards: usize,
    pub batch: BatchDefaults,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            max_shards: 100,
            batch: BatchDefaults::default(),
        }
    }
}

/// Per-shard batch-commit defaults (§6), expressed in the units a TOML file
/// can hold (milliseconds) and converted to [`BatchConfig`] on demand.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BatchDefaults {
    pub commit_batch_size: u64,
    pub commit_interval_ms: u64,
    pub refresh_interval_ms: u64,
}

impl Default for BatchDefaults {
    fn default() -> Self {
        let default = BatchConfig::default();
        Self {
            commit_batch_size: default.commit_batch_size,
            commit_interval_ms: default.commit_interval.as_millis() as u64,
            refresh_interval_ms: default.refresh_interval.as_millis() as u64,
        }
    }
}

impl From<BatchDefaults> for BatchConfig {
    fn from(d: BatchDefaults) -> Self {
        Self {
            commit_batch_size: d.commit_batch_size,
            commit_interval: Duration::from_millis(d.commit_interval_ms),
            refresh_interval: Duration::from_millis(d.refresh_interval_ms),
        }
    }
}

impl IndexConfig {
    /// Loads configuration from, in order: `./shardql.toml`, then
    /// `~/.config/shardql/config.toml`, falling back to defaults if neither
    /// exists.
    pub fn load() -> Result<Self> {
        let local = PathBuf::from("shardql.toml");
        if local.exists() {
            return Self::from_file(&local);
        }
        if let Some(dirs) = directories::ProjectDirs::from("", "", "shardql") {
            let user_config = dirs.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }
        log::debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = IndexConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.max_shards, 100);
        assert_eq!(config.batch.commit_batch_size, 1000);
    }

    #[test]
    fn parses_config_toml() {
        let toml = r#"
data_dir = "/var/lib/shardql"
max_shards = 8

[batch]
commit_batch_size = 500
commit_interval_ms = 2000
refresh_interval_ms = 500
"#;
        let config: IndexConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/shardql"));
        assert_eq!(config.max_shards, 8);
        assert_eq!(config.batch.commit_batch_size, 500);
        let batch_config: BatchConfig = config.batch.into();
        assert_eq!(batch_config.commit_interval, Duration::from_millis(2000));
    }
}
