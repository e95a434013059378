use std::num::ParseIntError;
use std::path::PathBuf;

use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid log filter '{0}'")]
    LogFilter(String),
}

/// A stored shard value that is not base-10 integer text
#[derive(Error, Debug)]
pub enum ParseShardError {
    #[error("shard value is not valid UTF-8")]
    NotUtf8,

    #[error("shard value '{value}' is not a 64-bit integer: {source}")]
    InvalidInteger {
        value: String,
        #[source]
        source: ParseIntError,
    },
}
