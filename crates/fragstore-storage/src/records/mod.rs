//! Record stores for users and chat entities.
//!
//! All record types live in one namespace (`Common` by default). The shard a
//! record belongs to comes from the fragmentation directory, and shard `n`'s
//! data is the store at `<namespace>/Shard_<n>.sqlite`.
//!
//! Placement is written before data: a failed data write leaves the key
//! assigned, and reads then report the record as not found.

mod chat;
mod user;

use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;

use fragstore_common::{ShardId, StorageConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::fragmentation::FragmentationDirectory;
use crate::path::StorageLocation;
use crate::store::StoreHandle;

pub use chat::{ChatHistory, ChatHistoryStore, Message, MessageStore};
pub use user::{User, UserStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    User,
    Message,
    ChatHistory,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::User => write!(f, "user"),
            RecordKind::Message => write!(f, "message"),
            RecordKind::ChatHistory => write!(f, "chat history"),
        }
    }
}

/// A persistable record with a string identity.
pub trait Record: Serialize + DeserializeOwned {
    const KIND: RecordKind;

    /// Identity of this record (person id, message id, conversation id).
    fn id(&self) -> &str;

    /// Key under which a record with identity `id` is stored and placed.
    fn storage_key(id: &str) -> String;
}

/// Leaf name of shard `shard`'s data store.
pub fn shard_leaf(shard: ShardId) -> String {
    format!("Shard_{}.sqlite", shard)
}

/// CRUD over one record type, routed through the fragmentation directory.
pub struct RecordStore<R> {
    directory: FragmentationDirectory,
    base_dir: PathBuf,
    namespace: String,
    default_shard: ShardId,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for RecordStore<R> {
    fn clone(&self) -> Self {
        Self {
            directory: self.directory.clone(),
            base_dir: self.base_dir.clone(),
            namespace: self.namespace.clone(),
            default_shard: self.default_shard,
            _record: PhantomData,
        }
    }
}

impl<R> fmt::Debug for RecordStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("base_dir", &self.base_dir)
            .field("namespace", &self.namespace)
            .field("default_shard", &self.default_shard)
            .finish()
    }
}

impl<R: Record> RecordStore<R> {
    /// Share `directory` (and its pool); take the record layout from `config`.
    pub fn new(directory: FragmentationDirectory, config: &StorageConfig) -> Self {
        Self {
            directory,
            base_dir: config.base_dir.clone(),
            namespace: config.record_namespace.clone(),
            default_shard: config.default_shard,
            _record: PhantomData,
        }
    }

    pub fn directory(&self) -> &FragmentationDirectory {
        &self.directory
    }

    /// Insert or overwrite `record`, returning the shard that holds it.
    ///
    /// A record without a placement is assigned the default shard first.
    pub fn save(&self, record: &R) -> Result<ShardId> {
        let id = validate_id::<R>(record.id())?;
        let key = R::storage_key(id);
        let bytes = encode(record)?;

        let shard = match self.directory.lookup(&key)? {
            Some(shard) => shard,
            None => {
                self.directory.add(self.default_shard, &[key.as_str()])?;
                self.default_shard
            }
        };

        let store = self.shard_store(shard)?;
        store.put(key.as_bytes(), &bytes)?;
        debug!("Saved {} {} to shard {}", R::KIND, id, shard);
        Ok(shard)
    }

    pub fn get(&self, id: &str) -> Result<R> {
        let id = validate_id::<R>(id)?;
        let key = R::storage_key(id);
        let shard = self.placement(id, &key)?;

        let store = self.shard_store(shard)?;
        let bytes = store
            .fetch(key.as_bytes())?
            .ok_or_else(|| not_found::<R>(id))?;
        decode(&bytes)
    }

    /// Overwrite an existing record. Never creates one.
    pub fn update(&self, record: &R) -> Result<()> {
        let id = validate_id::<R>(record.id())?;
        let key = R::storage_key(id);
        let bytes = encode(record)?;
        let shard = self.placement(id, &key)?;

        let store = self.shard_store(shard)?;
        let previous = store
            .tree()
            .fetch_and_update(key.as_bytes(), |current| current.map(|_| bytes.clone()))
            .map_err(|source| StorageError::Write {
                key: key.clone(),
                source,
            })?;
        if previous.is_none() {
            return Err(not_found::<R>(id));
        }
        store.flush_if_configured()?;

        debug!("Updated {} {} in shard {}", R::KIND, id, shard);
        Ok(())
    }

    /// Delete an existing record and its placement.
    ///
    /// A placement whose data is already gone is cleaned up, and the record
    /// is still reported as not found.
    pub fn delete(&self, id: &str) -> Result<()> {
        let id = validate_id::<R>(id)?;
        let key = R::storage_key(id);
        let shard = self.placement(id, &key)?;

        let previous = {
            let store = self.shard_store(shard)?;
            let previous = store
                .tree()
                .remove(key.as_bytes())
                .map_err(|source| StorageError::Delete {
                    key: key.clone(),
                    source,
                })?;
            store.flush_if_configured()?;
            previous
        };

        match self.directory.remove(&key) {
            Ok(()) => {}
            // A concurrent delete got there first.
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        if previous.is_none() {
            return Err(not_found::<R>(id));
        }
        debug!("Deleted {} {} from shard {}", R::KIND, id, shard);
        Ok(())
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        let id = validate_id::<R>(id)?;
        let key = R::storage_key(id);
        match self.directory.lookup(&key)? {
            Some(shard) => self.shard_store(shard)?.contains(key.as_bytes()),
            None => Ok(false),
        }
    }

    fn placement(&self, id: &str, key: &str) -> Result<ShardId> {
        self.directory
            .lookup(key)?
            .ok_or_else(|| not_found::<R>(id))
    }

    fn shard_store(&self, shard: ShardId) -> Result<StoreHandle> {
        let location =
            StorageLocation::new(&self.base_dir, &self.namespace).with_leaf(shard_leaf(shard));
        self.directory.pool().acquire(&location)
    }
}

fn validate_id<R: Record>(id: &str) -> Result<&str> {
    if id.is_empty() {
        return Err(StorageError::InvalidRecordId(R::KIND));
    }
    Ok(id)
}

fn not_found<R: Record>(id: &str) -> StorageError {
    StorageError::RecordNotFound {
        kind: R::KIND,
        id: id.to_string(),
    }
}

fn encode<R: Record>(record: &R) -> Result<Vec<u8>> {
    bincode::serialize(record).map_err(|source| StorageError::Serialize {
        kind: R::KIND,
        source,
    })
}

fn decode<R: Record>(bytes: &[u8]) -> Result<R> {
    bincode::deserialize(bytes).map_err(|source| StorageError::Deserialize {
        kind: R::KIND,
        source,
    })
}
