use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ingestion_corpus::{IndexerConfig, NamingTemplate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the driver paces batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    Continuous,
    SingleShot,
}

/// Replay settings. Every key is optional in the TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub shard_count: usize,
    pub interval_secs: u64,
    pub mode: RunMode,
    pub naming: NamingTemplate,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("data"),
            destination: PathBuf::from("realtime-data"),
            shard_count: 60,
            interval_secs: 3_600,
            mode: RunMode::Continuous,
            naming: NamingTemplate::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ReplayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_count == 0 {
            return Err(ConfigError::Invalid("shard_count must be >= 1".into()));
        }
        if self.mode == RunMode::Continuous && self.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "interval_secs must be >= 1 in continuous mode".into(),
            ));
        }
        if self.source == self.destination {
            return Err(ConfigError::Invalid(
                "source and destination must differ".into(),
            ));
        }
        if self.naming.prefix.is_empty() || self.naming.prefix.contains('-') {
            return Err(ConfigError::Invalid(
                "naming prefix must be non-empty and contain no '-'".into(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            naming: self.naming.clone(),
        }
    }
}
