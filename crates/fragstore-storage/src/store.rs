//! Key-value store access.
//!
//! A [`StorePool`] hands out [`StoreHandle`]s scoped to one logical
//! operation. sled locks its database directory exclusively and releases the
//! lock asynchronously, so engines are opened once per path for the whole
//! process and stay open. Every pool in the process shares that registry;
//! handles only borrow an engine and release the borrow on drop.
//!
//! ```rust,ignore
//! let pool = StorePool::new(StoreConfig::default());
//! let store = pool.acquire(&StorageLocation::new("Database/", "Common").with_leaf("Shard_0.sqlite"))?;
//! store.put(b"user_1", b"...")?;
//! store.close();
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fragstore_common::StorageConfig;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::path::StorageLocation;

/// Open engines, keyed by canonical store path.
static ENGINES: Lazy<Mutex<HashMap<PathBuf, sled::Db>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Engine tuning applied to every store a pool opens.
///
/// An engine is configured by whichever pool opens its path first.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub cache_capacity_bytes: u64,
    pub flush_on_write: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for StoreConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            cache_capacity_bytes: config.cache_capacity_bytes,
            flush_on_write: config.flush_on_write,
        }
    }
}

/// Scoped access to on-disk stores, keyed by resolved path.
#[derive(Clone)]
pub struct StorePool {
    config: StoreConfig,
    active: Arc<AtomicUsize>,
}

impl StorePool {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Resolve `location` and acquire a handle to the store there.
    ///
    /// Fails with `DatabaseOpen` when the engine cannot open the path
    /// (corruption, another process holding the lock, disk failure).
    pub fn acquire(&self, location: &StorageLocation) -> Result<StoreHandle> {
        let path = location.resolve()?;
        let db = self.engine(&path)?;
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(StoreHandle {
            db,
            path,
            flush_on_write: self.config.flush_on_write,
            active: Arc::clone(&self.active),
        })
    }

    /// Acquire the store at `base/namespace[/leaf]`.
    pub fn open(
        &self,
        base_dir: impl Into<PathBuf>,
        namespace: impl Into<String>,
        leaf: Option<&str>,
    ) -> Result<StoreHandle> {
        let mut location = StorageLocation::new(base_dir, namespace);
        if let Some(leaf) = leaf {
            location = location.with_leaf(leaf);
        }
        self.acquire(&location)
    }

    /// Number of handles from this pool that are still alive.
    pub fn active_handles(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Flush every engine open in the process.
    pub fn flush_all(&self) -> Result<()> {
        let engines: Vec<(PathBuf, sled::Db)> = ENGINES
            .lock()
            .iter()
            .map(|(path, db)| (path.clone(), db.clone()))
            .collect();
        for (path, db) in engines {
            db.flush()
                .map_err(|source| StorageError::Flush { path, source })?;
        }
        Ok(())
    }

    fn engine(&self, path: &Path) -> Result<sled::Db> {
        let key = registry_key(path);
        let mut engines = ENGINES.lock();

        if let Some(db) = engines.get(&key) {
            return Ok(db.clone());
        }

        debug!("Opening store at: {:?}", path);
        // With flush-on-write every mutation is already durable.
        let flush_every_ms = if self.config.flush_on_write {
            None
        } else {
            Some(500)
        };
        let db = sled::Config::new()
            .path(path)
            .cache_capacity(self.config.cache_capacity_bytes)
            .flush_every_ms(flush_every_ms)
            .open()
            .map_err(|source| StorageError::DatabaseOpen {
                path: path.to_path_buf(),
                source,
            })?;

        engines.insert(key, db.clone());
        Ok(db)
    }
}

impl fmt::Debug for StorePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorePool")
            .field("config", &self.config)
            .field("active_handles", &self.active_handles())
            .finish()
    }
}

/// An open store, valid for one logical operation.
///
/// Released on drop, on every exit path.
pub struct StoreHandle {
    db: sled::Db,
    path: PathBuf,
    flush_on_write: bool,
    active: Arc<AtomicUsize>,
}

impl StoreHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Most recently put value, or `KeyNotFound`.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.fetch(key)?.ok_or_else(|| StorageError::KeyNotFound {
            key: display_key(key),
        })
    }

    /// Most recently put value, if any.
    pub fn fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.tree()
            .get(key)
            .map(|value| value.map(|v| v.to_vec()))
            .map_err(|source| StorageError::Read {
                key: display_key(key),
                source,
            })
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        self.tree()
            .contains_key(key)
            .map_err(|source| StorageError::Read {
                key: display_key(key),
                source,
            })
    }

    /// Overwrite the value for `key`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tree()
            .insert(key, value)
            .map_err(|source| StorageError::Write {
                key: display_key(key),
                source,
            })?;
        self.flush_if_configured()
    }

    /// Remove `key`. Deleting an absent key is not an error.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.tree()
            .remove(key)
            .map_err(|source| StorageError::Delete {
                key: display_key(key),
                source,
            })?;
        self.flush_if_configured()
    }

    /// All entries whose key starts with `prefix`, in key order.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.tree()
            .scan_prefix(prefix)
            .map(|entry| {
                entry
                    .map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .map_err(|source| StorageError::Read {
                        key: display_key(prefix),
                        source,
                    })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree().is_empty()
    }

    pub fn flush(&self) -> Result<()> {
        self.tree()
            .flush()
            .map(|_| ())
            .map_err(|source| StorageError::Flush {
                path: self.path.clone(),
                source,
            })
    }

    /// Release the handle. Equivalent to dropping it.
    pub fn close(self) {}

    pub(crate) fn tree(&self) -> &sled::Db {
        &self.db
    }

    pub(crate) fn flush_if_configured(&self) -> Result<()> {
        if self.flush_on_write {
            self.flush()?;
        }
        Ok(())
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle").field("path", &self.path).finish()
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Same physical store, same key, however the path was spelled.
fn registry_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

pub(crate) fn display_key(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> StorePool {
        StorePool::new(StoreConfig::default())
    }

    #[test]
    fn test_put_get_delete() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let location = StorageLocation::new(dir.path(), "test_shard").with_leaf("test.db");
        let store = pool().acquire(&location).expect("Failed to open store");

        store.put(b"test_key", b"test_value").unwrap();
        assert_eq!(store.get(b"test_key").unwrap(), b"test_value".to_vec());
        assert!(store.contains(b"test_key").unwrap());

        store.delete(b"test_key").unwrap();
        assert!(matches!(
            store.get(b"test_key"),
            Err(StorageError::KeyNotFound { .. })
        ));
        assert_eq!(store.fetch(b"test_key").unwrap(), None);
    }

    #[test]
    fn test_put_overwrites() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = pool()
            .acquire(&StorageLocation::new(dir.path(), "ns"))
            .unwrap();

        store.put(b"k", b"one").unwrap();
        store.put(b"k", b"two").unwrap();
        assert_eq!(store.get(b"k").unwrap(), b"two".to_vec());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_absent_is_ok() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = pool()
            .acquire(&StorageLocation::new(dir.path(), "ns"))
            .unwrap();

        assert!(store.delete(b"never_written").is_ok());
        assert!(store.is_empty());
    }

    #[test]
    fn test_binary_safe_values() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = pool()
            .acquire(&StorageLocation::new(dir.path(), "ns"))
            .unwrap();

        let value = vec![0u8, 255, 0, 1, 2, 0];
        store.put(&[0, 1, 0], &value).unwrap();
        assert_eq!(store.get(&[0, 1, 0]).unwrap(), value);
    }

    #[test]
    fn test_scan_prefix_in_key_order() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = pool()
            .acquire(&StorageLocation::new(dir.path(), "ns"))
            .unwrap();

        store.put(b"chat_2", b"b").unwrap();
        store.put(b"history_1", b"x").unwrap();
        store.put(b"chat_1", b"a").unwrap();

        let entries = store.scan_prefix(b"chat_").unwrap();
        let keys: Vec<&[u8]> = entries.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"chat_1".as_slice(), b"chat_2".as_slice()]);
    }

    #[test]
    fn test_handles_share_engine_and_release() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let pool = pool();
        let location = StorageLocation::new(dir.path(), "ns");

        let first = pool.acquire(&location).unwrap();
        let second = pool.acquire(&location).unwrap();
        assert_eq!(pool.active_handles(), 2);

        first.put(b"k", b"v").unwrap();
        assert_eq!(second.get(b"k").unwrap(), b"v".to_vec());

        first.close();
        assert_eq!(pool.active_handles(), 1);
        drop(second);
        assert_eq!(pool.active_handles(), 0);
    }

    #[test]
    fn test_independent_pools_share_engine() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let location = StorageLocation::new(dir.path(), "ns").with_leaf("store");

        let writer_pool = pool();
        let reader_pool = pool();
        let held = writer_pool.acquire(&location).unwrap();
        held.put(b"shared", b"yes").unwrap();

        let reader = reader_pool.acquire(&location).unwrap();
        assert_eq!(reader.get(b"shared").unwrap(), b"yes".to_vec());
        assert_eq!(writer_pool.active_handles(), 1);
        assert_eq!(reader_pool.active_handles(), 1);
    }

    #[test]
    fn test_differently_spelled_paths_share_engine() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let pool = pool();

        let plain = pool.open(dir.path(), "ns", Some("store")).unwrap();
        let dotted = pool.open(dir.path().join("."), "./ns/", Some("store")).unwrap();
        plain.put(b"k", b"v").unwrap();
        assert_eq!(dotted.get(b"k").unwrap(), b"v".to_vec());
    }

    #[test]
    fn test_repeated_acquire_release_churn() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let pool = pool();
        let location = StorageLocation::new(dir.path(), "ns").with_leaf("store");

        for i in 0..500u32 {
            let key = i.to_be_bytes();
            pool.acquire(&location).unwrap().put(&key, b"v").unwrap();
            let store = pool.acquire(&location).unwrap();
            assert_eq!(store.get(&key).unwrap(), b"v".to_vec());
            store.close();
        }
        assert_eq!(pool.active_handles(), 0);
        assert_eq!(pool.acquire(&location).unwrap().len(), 500);
    }

    #[test]
    fn test_flush_all() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let pool = StorePool::new(StoreConfig {
            flush_on_write: false,
            ..StoreConfig::default()
        });
        pool.open(dir.path(), "ns", None).unwrap().put(b"k", b"v").unwrap();
        pool.flush_all().unwrap();
    }

    #[test]
    fn test_open_invalid_location() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let err = pool()
            .acquire(&StorageLocation::new(dir.path(), ""))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }

    #[test]
    fn test_open_by_components() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let pool = pool();

        let store = pool.open(dir.path(), "Common", Some("Shard_3.sqlite")).unwrap();
        assert_eq!(store.path(), dir.path().join("Common").join("Shard_3.sqlite"));
        store.put(b"k", b"v").unwrap();
        store.close();

        let namespace_only = pool.open(dir.path(), "Common", None).unwrap();
        assert_eq!(namespace_only.path(), dir.path().join("Common"));
        assert_eq!(pool.active_handles(), 1);
    }
}
