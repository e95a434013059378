//! Logical location -> physical path resolution.
//!
//! A location is `(base_dir, namespace, [leaf...])`. Resolving it creates
//! `base_dir/namespace` on demand; the leaf is appended without being created
//! since it usually names the store itself.

use std::fs::DirBuilder;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, StorageError};

/// A logical storage location, resolved per call and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocation {
    base_dir: PathBuf,
    namespace: String,
    leaf: Option<String>,
}

impl StorageLocation {
    pub fn new(base_dir: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            namespace: namespace.into(),
            leaf: None,
        }
    }

    pub fn with_leaf(mut self, leaf: impl Into<String>) -> Self {
        self.leaf = Some(leaf.into());
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn leaf(&self) -> Option<&str> {
        self.leaf.as_deref()
    }

    /// Resolve to a physical path, creating `base_dir/namespace` if missing.
    pub fn resolve(&self) -> Result<PathBuf> {
        let base = self.base_dir.to_string_lossy();
        match &self.leaf {
            Some(leaf) => resolve(&[base.as_ref(), self.namespace.as_str(), leaf.as_str()]),
            None => resolve(&[base.as_ref(), self.namespace.as_str()]),
        }
    }
}

/// Resolve `components` into a path.
///
/// The first two components (trimmed of surrounding whitespace) form the
/// directory that is created if absent. Any further components are collapsed
/// into one relative tail and appended without touching the filesystem.
pub fn resolve<S: AsRef<str>>(components: &[S]) -> Result<PathBuf> {
    if components.len() < 2 {
        return Err(StorageError::InvalidPath(format!(
            "at least 2 path components required, got {}",
            components.len()
        )));
    }

    let trimmed: Vec<&str> = components.iter().map(|c| c.as_ref().trim()).collect();
    let base = trimmed[0];
    let namespace = clean(trimmed[1]);
    if base.is_empty() {
        return Err(StorageError::InvalidPath("base directory cannot be empty".into()));
    }
    if namespace == "." {
        return Err(StorageError::InvalidPath("namespace cannot be empty".into()));
    }

    let dir = Path::new(base).join(&namespace);
    ensure_dir(&dir)?;

    let tail = clean(&trimmed[2..].join("/"));
    if tail == "." {
        Ok(dir)
    } else {
        Ok(dir.join(tail))
    }
}

/// Strip leading/trailing `/` and lexically normalize the remaining path.
///
/// Collapses repeated separators, drops `.` segments and folds `..` into the
/// preceding segment where one exists. An empty result is `"."`. Pure and
/// idempotent.
pub fn clean(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.trim_matches('/').split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder
        .create(dir)
        .map_err(|source| StorageError::DirectoryCreate {
            path: dir.to_path_buf(),
            source,
        })?;

    debug!("Created directory: {:?}", dir);
    Ok(())
}
