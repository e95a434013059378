use std::path::PathBuf;

use fragstore_common::ParseShardError;
use thiserror::Error;

use crate::records::RecordKind;

/// Coarse classification of a [`StorageError`].
///
/// Lets callers branch on "does this exist" versus "is storage broken"
/// without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before any I/O
    Validation,
    /// The storage engine could not open or create the target
    Open,
    /// Key or record absent
    NotFound,
    /// Stored shard value is not base-10 integer text
    Conversion,
    /// Put/delete failed on an open store
    Write,
    /// Get/scan failed on an open store
    Read,
    /// Record encoding or decoding failed
    Serialization,
}

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("key cannot be empty")]
    EmptyKey,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("failed to create directory {path:?}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open database at {path:?}: {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },

    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    #[error("read failed for key {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: sled::Error,
    },

    #[error("write failed for key {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: sled::Error,
    },

    #[error("delete failed for key {key}: {source}")]
    Delete {
        key: String,
        #[source]
        source: sled::Error,
    },

    #[error("flush failed for {path:?}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },

    #[error("shard not found for key {key}")]
    ShardNotFound { key: String },

    #[error("failed to convert shard for key {key}: {source}")]
    ShardConversion {
        key: String,
        #[source]
        source: ParseShardError,
    },

    #[error("failed to write fragmentation entry for key {key}: {source}")]
    FragmentationWrite {
        key: String,
        #[source]
        source: sled::Error,
    },

    #[error("failed to write fragmentation batch of {count} keys: {source}")]
    FragmentationBatch {
        count: usize,
        #[source]
        source: sled::Error,
    },

    #[error("failed to read fragmentation entry for key {key}: {source}")]
    FragmentationRead {
        key: String,
        #[source]
        source: sled::Error,
    },

    #[error("{0} id cannot be empty")]
    InvalidRecordId(RecordKind),

    #[error("{kind} not found: {id}")]
    RecordNotFound { kind: RecordKind, id: String },

    #[error("failed to serialize {kind}: {source}")]
    Serialize {
        kind: RecordKind,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to deserialize {kind}: {source}")]
    Deserialize {
        kind: RecordKind,
        #[source]
        source: bincode::Error,
    },
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::EmptyKey
            | StorageError::InvalidPath(_)
            | StorageError::InvalidRecordId(_) => ErrorKind::Validation,
            StorageError::DirectoryCreate { .. } | StorageError::DatabaseOpen { .. } => {
                ErrorKind::Open
            }
            StorageError::KeyNotFound { .. }
            | StorageError::ShardNotFound { .. }
            | StorageError::RecordNotFound { .. } => ErrorKind::NotFound,
            StorageError::ShardConversion { .. } => ErrorKind::Conversion,
            StorageError::Write { .. }
            | StorageError::Delete { .. }
            | StorageError::Flush { .. }
            | StorageError::FragmentationWrite { .. }
            | StorageError::FragmentationBatch { .. } => ErrorKind::Write,
            StorageError::Read { .. } | StorageError::FragmentationRead { .. } => ErrorKind::Read,
            StorageError::Serialize { .. } | StorageError::Deserialize { .. } => {
                ErrorKind::Serialization
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
