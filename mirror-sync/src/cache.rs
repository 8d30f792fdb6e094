//! Run-wide shared state: the digest cache and the liveness mark set.
//!
//! Both structures own their lock and are only reachable through narrow
//! operations; clones share the same underlying map. Every critical section
//! is a single map operation, so a poisoned lock still guards consistent
//! data and is recovered rather than propagated.

use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use sha2::{Digest, Sha256};

use mirror_core::FileMap;

use crate::cancel::CancelScope;
use crate::error::{io_err, SyncError};

const HASH_CHUNK: usize = 64 * 1024;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// HashCache
// ---------------------------------------------------------------------------

/// Logical path → SHA-256 hex digest, shared by every context in a run.
#[derive(Debug, Clone, Default)]
pub struct HashCache {
    inner: Arc<RwLock<FileMap>>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache from a persisted file table.
    pub fn from_files(files: FileMap) -> Self {
        Self {
            inner: Arc::new(RwLock::new(files)),
        }
    }

    pub fn get(&self, path: &str) -> Option<String> {
        read(&self.inner).get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        read(&self.inner).contains_key(path)
    }

    /// Record `digest` for `path` unless another writer got there first.
    ///
    /// Returns the digest now stored for `path`.
    pub fn insert(&self, path: &str, digest: String) -> String {
        write(&self.inner)
            .entry(path.to_string())
            .or_insert(digest)
            .clone()
    }

    /// Drop the entry for `path`, returning the digest it held.
    pub fn remove(&self, path: &str) -> Option<String> {
        write(&self.inner).remove(path)
    }

    pub fn len(&self) -> usize {
        read(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.inner).is_empty()
    }

    /// Copy of the current map.
    pub fn snapshot(&self) -> FileMap {
        read(&self.inner).clone()
    }

    /// Whether `other` is a handle to the same underlying map.
    pub fn shares_with(&self, other: &HashCache) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Stream `path` through SHA-256 and return the lowercase hex digest.
///
/// `scope` is polled between chunks; once it is cancelled hashing stops with
/// [`SyncError::Aborted`].
pub fn hash_file(path: &Path, scope: &CancelScope) -> Result<String, SyncError> {
    scope.checkpoint()?;
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_err(path, e)),
        };
        hasher.update(&buf[..n]);
        scope.checkpoint()?;
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// LiveSet
// ---------------------------------------------------------------------------

/// Logical paths marked as still wanted during the current run.
///
/// Marks only accumulate; the set is handed to the sweep once the run ends.
#[derive(Debug, Clone, Default)]
pub struct LiveSet {
    inner: Arc<RwLock<HashSet<String>>>,
}

impl LiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `path` live. Idempotent.
    pub fn mark(&self, path: &str) {
        let mut set = write(&self.inner);
        if !set.contains(path) {
            set.insert(path.to_string());
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        read(&self.inner).contains(path)
    }

    pub fn len(&self) -> usize {
        read(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.inner).is_empty()
    }

    /// Sorted copy of the marked paths.
    pub fn snapshot(&self) -> BTreeSet<String> {
        read(&self.inner).iter().cloned().collect()
    }

    /// Whether `other` is a handle to the same underlying set.
    pub fn shares_with(&self, other: &LiveSet) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
