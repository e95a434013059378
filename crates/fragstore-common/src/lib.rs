//! Fragstore common types and utilities
//!
//! Shared by the storage layer and the `fragctl` binary:
//! - [`ShardId`] / [`ShardAssignment`]: the shard directory data model
//! - [`Config`]: TOML configuration with defaults
//! - [`telemetry`]: `tracing` subscriber bootstrap

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::{Config, LoggingConfig, StorageConfig};
pub use error::{ConfigError, ParseShardError};
pub use types::{ShardAssignment, ShardId};
