use super::errors::lock_poisoned_error;
use super::kind::ResourceKey;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// In-memory mirror of cluster objects, keyed by `ResourceKey`.
///
/// Written by exactly one watch task and read from anywhere. Every read takes
/// a short read lock and clones what it returns, so readers never observe a
/// half-applied update. Use `snapshot()` when you need to iterate.
#[derive(Debug)]
pub struct ResourceMirror<K> {
    inner: Arc<RwLock<HashMap<ResourceKey, K>>>,
}

impl<K> Clone for ResourceMirror<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> Default for ResourceMirror<K> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K: Clone> ResourceMirror<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared access for readers.
    ///
    /// A poisoned lock is recovered rather than read as empty: the writer
    /// replaces or upserts whole objects, so the map itself stays usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ResourceKey, K>> {
        self.inner.read().unwrap_or_else(|poisoned| {
            warn!("Resource mirror lock poisoned by a panicking writer, reading last state");
            PoisonError::into_inner(poisoned)
        })
    }

    #[must_use]
    pub fn get(&self, key: &ResourceKey) -> Option<K> {
        self.read().get(key).cloned()
    }

    #[must_use]
    pub fn contains_key(&self, key: &ResourceKey) -> bool {
        self.read().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of the current keys
    #[must_use]
    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn values(&self) -> Vec<K> {
        self.read().values().cloned().collect()
    }

    /// Owned copy of the whole mirror, stable while the watch keeps writing
    #[must_use]
    pub fn snapshot(&self) -> HashMap<ResourceKey, K> {
        self.read().clone()
    }

    /// Exclusive access for the watch task
    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<ResourceKey, K>>> {
        self.inner
            .write()
            .map_err(|_| lock_poisoned_error("resource mirror write lock"))
    }
}
