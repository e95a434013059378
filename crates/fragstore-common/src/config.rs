//! Fragstore configuration.
//!
//! Every field has a default, so an empty TOML file (or no file at all) yields
//! the stock layout: `Database/GlobalSchema` for the shard directory and
//! `Database/Common/Shard_<n>.sqlite` for record data.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::ShardId;

pub const DEFAULT_BASE_DIR: &str = "Database/";
pub const GLOBAL_SCHEMA_NAMESPACE: &str = "GlobalSchema";
pub const COMMON_NAMESPACE: &str = "Common";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of every namespace directory
    pub base_dir: PathBuf,
    /// Namespace holding the key -> shard index
    pub directory_namespace: String,
    /// Namespace holding serialized record data
    pub record_namespace: String,
    /// Shard assigned to records saved without a prior assignment
    pub default_shard: ShardId,
    /// Flush the engine after every mutation before returning
    pub flush_on_write: bool,
    /// Page cache size per open store
    pub cache_capacity_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            directory_namespace: GLOBAL_SCHEMA_NAMESPACE.to_string(),
            record_namespace: COMMON_NAMESPACE.to_string(),
            default_shard: ShardId::new(0),
            flush_on_write: true,
            cache_capacity_bytes: 8 * 1024 * 1024,
        }
    }
}

impl StorageConfig {
    /// Default layout rooted at `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `fragstore_storage=debug`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}
