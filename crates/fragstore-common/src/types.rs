//! Shard directory data model.
//!
//! A [`ShardId`] is persisted as ASCII base-10 text so the directory store
//! stays human-inspectable (`"42"`, `"-1"`), never as raw integer bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseShardError;

/// Identifier of the shard that owns a record key.
///
/// Any `i64` is a legal shard id, negative values included. Absence of an
/// assignment is expressed with `Option<ShardId>`, never with a sentinel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(i64);

impl ShardId {
    #[inline]
    pub const fn new(shard: i64) -> Self {
        Self(shard)
    }

    #[inline]
    pub const fn get(&self) -> i64 {
        self.0
    }

    /// Encode as the decimal text stored in the directory.
    pub fn to_decimal_bytes(&self) -> Vec<u8> {
        self.0.to_string().into_bytes()
    }

    /// Decode a stored directory value.
    pub fn from_decimal_bytes(raw: &[u8]) -> Result<Self, ParseShardError> {
        let text = std::str::from_utf8(raw).map_err(|_| ParseShardError::NotUtf8)?;
        text.parse()
    }
}

impl FromStr for ShardId {
    type Err = ParseShardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Self)
            .map_err(|e| ParseShardError::InvalidInteger {
                value: s.to_string(),
                source: e,
            })
    }
}

impl From<i64> for ShardId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<i32> for ShardId {
    fn from(value: i32) -> Self {
        Self(i64::from(value))
    }
}

impl From<u32> for ShardId {
    fn from(value: u32) -> Self {
        Self(i64::from(value))
    }
}

impl From<ShardId> for i64 {
    fn from(shard: ShardId) -> Self {
        shard.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the fragmentation directory: `key` is owned by `shard`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardAssignment {
    pub key: String,
    pub shard: ShardId,
}

impl ShardAssignment {
    pub fn new(key: impl Into<String>, shard: impl Into<ShardId>) -> Self {
        Self {
            key: key.into(),
            shard: shard.into(),
        }
    }
}
