//! Fragmentation directory: the durable record key -> shard index.
//!
//! Backed by one store at `base_dir/GlobalSchema`. Keys are raw record keys,
//! values are the owning shard as decimal text. Every operation acquires a
//! handle, performs one logical action and releases the handle before it
//! returns.
//!
//! Mutations are single engine operations:
//! - `add` writes its whole batch atomically (all non-empty keys or none)
//! - `update` is a conditional write that only replaces a present value
//! - `remove` deletes and reports absence in the same step
//!
//! so there is no check-then-act window between concurrent callers. Distinct
//! keys never interfere; concurrent writers of one key are last-writer-wins.

use std::path::PathBuf;

use fragstore_common::config::GLOBAL_SCHEMA_NAMESPACE;
use fragstore_common::{ShardAssignment, ShardId, StorageConfig};
use tracing::{debug, info, warn};

use crate::error::{Result, StorageError};
use crate::path::StorageLocation;
use crate::store::{display_key, StoreConfig, StoreHandle, StorePool};

#[derive(Debug, Clone)]
pub struct FragmentationDirectory {
    pool: StorePool,
    location: StorageLocation,
}

impl FragmentationDirectory {
    /// Directory at `base_dir/GlobalSchema`.
    pub fn new(pool: StorePool, base_dir: impl Into<PathBuf>) -> Self {
        Self::with_namespace(pool, base_dir, GLOBAL_SCHEMA_NAMESPACE)
    }

    pub fn with_namespace(
        pool: StorePool,
        base_dir: impl Into<PathBuf>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            location: StorageLocation::new(base_dir, namespace),
        }
    }

    pub fn from_config(pool: StorePool, config: &StorageConfig) -> Self {
        Self::with_namespace(pool, &config.base_dir, &config.directory_namespace)
    }

    /// Directory with its own pool, configured from `config`.
    pub fn open(config: &StorageConfig) -> Self {
        Self::from_config(StorePool::new(StoreConfig::from(config)), config)
    }

    pub fn pool(&self) -> &StorePool {
        &self.pool
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Assign every key in `keys` to `shard`, overwriting prior assignments.
    ///
    /// Empty keys inside the list are skipped with a warning; a list with no
    /// non-empty key is rejected with `EmptyKey` before any I/O. The remaining
    /// keys are written as one atomic batch. Returns how many were written.
    pub fn add<K: AsRef<str>>(&self, shard: impl Into<ShardId>, keys: &[K]) -> Result<usize> {
        if keys.is_empty() {
            return Err(StorageError::EmptyKey);
        }

        let shard = shard.into();
        let encoded = shard.to_decimal_bytes();
        let mut batch = sled::Batch::default();
        let mut accepted: Vec<&str> = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            if key.is_empty() {
                warn!("Skipping empty key in fragmentation add for shard {}", shard);
                continue;
            }
            batch.insert(key.as_bytes(), encoded.as_slice());
            accepted.push(key);
        }

        if accepted.is_empty() {
            return Err(StorageError::EmptyKey);
        }

        let store = self.handle()?;
        store.tree().apply_batch(batch).map_err(|source| match accepted.as_slice() {
            [key] => StorageError::FragmentationWrite {
                key: key.to_string(),
                source,
            },
            _ => StorageError::FragmentationBatch {
                count: accepted.len(),
                source,
            },
        })?;
        store.flush_if_configured()?;

        for key in &accepted {
            debug!("Added fragmentation: key={} -> shard={}", key, shard);
        }
        info!("Assigned {} keys to shard {}", accepted.len(), shard);
        Ok(accepted.len())
    }

    /// Shard owning `key`, or `ShardNotFound`.
    pub fn get(&self, key: &str) -> Result<ShardId> {
        self.lookup(key)?.ok_or_else(|| StorageError::ShardNotFound {
            key: key.to_string(),
        })
    }

    /// Shard owning `key`, if assigned.
    pub fn lookup(&self, key: &str) -> Result<Option<ShardId>> {
        validate_key(key)?;
        let store = self.handle()?;
        let raw = store
            .tree()
            .get(key.as_bytes())
            .map_err(|source| StorageError::FragmentationRead {
                key: key.to_string(),
                source,
            })?;
        raw.map(|value| decode_shard(key, &value)).transpose()
    }

    /// Whether `key` has an assignment. Absence is `Ok(false)`, not an error.
    pub fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let store = self.handle()?;
        store
            .tree()
            .contains_key(key.as_bytes())
            .map_err(|source| StorageError::FragmentationRead {
                key: key.to_string(),
                source,
            })
    }

    /// Reassign an existing key. Never creates an assignment.
    pub fn update(&self, key: &str, new_shard: impl Into<ShardId>) -> Result<()> {
        validate_key(key)?;
        let new_shard = new_shard.into();
        let encoded = new_shard.to_decimal_bytes();

        let store = self.handle()?;
        let previous = store
            .tree()
            .fetch_and_update(key.as_bytes(), |current| {
                current.map(|_| encoded.clone())
            })
            .map_err(|source| StorageError::FragmentationWrite {
                key: key.to_string(),
                source,
            })?;

        if previous.is_none() {
            return Err(StorageError::ShardNotFound {
                key: key.to_string(),
            });
        }
        store.flush_if_configured()?;

        info!("Updated fragmentation: key={} -> shard={}", key, new_shard);
        Ok(())
    }

    /// Drop the assignment for `key`. Removing an unknown key is an error.
    pub fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let store = self.handle()?;
        let previous = store
            .tree()
            .remove(key.as_bytes())
            .map_err(|source| StorageError::FragmentationWrite {
                key: key.to_string(),
                source,
            })?;

        if previous.is_none() {
            debug!("Key {} not found in fragmentation schema", key);
            return Err(StorageError::ShardNotFound {
                key: key.to_string(),
            });
        }
        store.flush_if_configured()?;

        info!("Removed fragmentation entry for key: {}", key);
        Ok(())
    }

    /// Every assignment, in key order.
    pub fn assignments(&self) -> Result<Vec<ShardAssignment>> {
        let store = self.handle()?;
        let mut assignments = Vec::new();
        for entry in store.tree().iter() {
            let (key, value) = entry.map_err(|source| StorageError::FragmentationRead {
                key: "*".to_string(),
                source,
            })?;
            let key = display_key(&key);
            let shard = decode_shard(&key, &value)?;
            assignments.push(ShardAssignment { key, shard });
        }
        Ok(assignments)
    }

    /// Keys currently assigned to `shard`, in key order. Scans the directory.
    pub fn keys_in_shard(&self, shard: impl Into<ShardId>) -> Result<Vec<String>> {
        let shard = shard.into();
        Ok(self
            .assignments()?
            .into_iter()
            .filter(|a| a.shard == shard)
            .map(|a| a.key)
            .collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.handle()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.handle()?.is_empty())
    }

    fn handle(&self) -> Result<StoreHandle> {
        self.pool.acquire(&self.location)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StorageError::EmptyKey);
    }
    Ok(())
}

fn decode_shard(key: &str, raw: &[u8]) -> Result<ShardId> {
    ShardId::from_decimal_bytes(raw).map_err(|source| StorageError::ShardConversion {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(base: &std::path::Path) -> FragmentationDirectory {
        FragmentationDirectory::new(StorePool::new(StoreConfig::default()), base)
    }

    #[test]
    fn test_values_are_decimal_text() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let fragmentation = directory(dir.path());
        fragmentation.add(-12, &["user_001"]).unwrap();

        let store = fragmentation.handle().unwrap();
        assert_eq!(store.get(b"user_001").unwrap(), b"-12".to_vec());
    }

    #[test]
    fn test_get_corrupt_value_is_conversion_error() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let fragmentation = directory(dir.path());
        {
            let store = fragmentation.handle().unwrap();
            store.put(b"corrupt", b"not-a-number").unwrap();
        }

        let err = fragmentation.get("corrupt").unwrap_err();
        assert!(matches!(err, StorageError::ShardConversion { .. }));
        // Corruption is scoped to that one key.
        fragmentation.add(1, &["healthy"]).unwrap();
        assert_eq!(fragmentation.get("healthy").unwrap(), ShardId::new(1));
    }

    #[test]
    fn test_lookup_distinguishes_absent_from_negative() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let fragmentation = directory(dir.path());
        fragmentation.add(-1, &["negative"]).unwrap();

        assert_eq!(fragmentation.lookup("negative").unwrap(), Some(ShardId::new(-1)));
        assert_eq!(fragmentation.lookup("missing").unwrap(), None);
    }

    #[test]
    fn test_all_empty_batch_is_rejected() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let fragmentation = directory(dir.path());

        let err = fragmentation.add(1, &["", ""]).unwrap_err();
        assert!(matches!(err, StorageError::EmptyKey));
        assert!(!dir.path().join("GlobalSchema").exists());
    }

    #[test]
    fn test_handles_released_after_each_operation() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let fragmentation = directory(dir.path());

        fragmentation.add(1, &["a"]).unwrap();
        assert_eq!(fragmentation.pool().active_handles(), 0);
        let _ = fragmentation.update("missing", 2);
        assert_eq!(fragmentation.pool().active_handles(), 0);
        let _ = fragmentation.get("a");
        assert_eq!(fragmentation.pool().active_handles(), 0);
    }
}
