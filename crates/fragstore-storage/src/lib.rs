//! Fragstore storage layer
//!
//! Durable shard placement for a partitioned key-value store:
//! - [`path`]: `(base_dir, namespace, [leaf])` -> physical path, creating
//!   directories on demand
//! - [`store`]: scoped handles over on-disk sled stores
//! - [`fragmentation`]: the record key -> shard directory
//! - [`records`]: user and chat record stores placed through the directory
//!
//! # Usage
//!
//! ```rust,ignore
//! use fragstore_common::StorageConfig;
//! use fragstore_storage::FragmentationDirectory;
//!
//! let directory = FragmentationDirectory::open(&StorageConfig::default());
//! directory.add(1, &["user_42"])?;
//! assert_eq!(directory.get("user_42")?.get(), 1);
//! directory.update("user_42", 7)?;
//! directory.remove("user_42")?;
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod fragmentation;
pub mod path;
pub mod records;
pub mod store;

pub use error::{ErrorKind, Result, StorageError};
pub use fragmentation::FragmentationDirectory;
pub use path::{clean, resolve, StorageLocation};
pub use records::{
    ChatHistory, ChatHistoryStore, Message, MessageStore, Record, RecordKind, RecordStore, User,
    UserStore,
};
pub use store::{StoreConfig, StoreHandle, StorePool};

use fragstore_common::StorageConfig;

/// The directory and every record store, sharing one handle pool.
#[derive(Debug, Clone)]
pub struct StorageContext {
    pub directory: FragmentationDirectory,
    pub users: UserStore,
    pub messages: MessageStore,
    pub histories: ChatHistoryStore,
}

impl StorageContext {
    pub fn open(config: &StorageConfig) -> Self {
        let directory = FragmentationDirectory::open(config);
        Self {
            users: UserStore::new(directory.clone(), config),
            messages: MessageStore::new(directory.clone(), config),
            histories: ChatHistoryStore::new(directory.clone(), config),
            directory,
        }
    }
}
