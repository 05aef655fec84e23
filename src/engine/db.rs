//! The keyspace: numbered databases of string values.
//!
//! The transaction core treats the value store as an opaque map; what
//! matters here is that every database carries its watch index and that
//! flushing the data leaves the index intact (watchers survive a flush,
//! their keys just stop existing).

use super::watch::WatchIndex;
use ahash::AHashMap;
use bytes::Bytes;
use std::sync::Arc;

/// Number of numbered databases, as selected by SELECT.
pub const NUM_DATABASES: usize = 16;

pub struct Db {
    pub(crate) data: AHashMap<Arc<str>, Bytes>,
    pub(crate) watch: WatchIndex,
}

impl Db {
    pub fn new() -> Self {
        Db {
            data: AHashMap::new(),
            watch: WatchIndex::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.data.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw insert. Callers go through the dirty-tracking wrappers on
    /// `ServerState` so the watch hook always fires.
    pub(crate) fn insert(&mut self, key: &str, value: Bytes) {
        match self.data.get_mut(key) {
            Some(slot) => *slot = value,
            None => {
                self.data.insert(Arc::from(key), value);
            }
        }
    }

    /// Raw removal; true if the key was present.
    pub(crate) fn remove(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    /// Drop all data. The watch index is deliberately untouched.
    pub(crate) fn clear(&mut self) -> usize {
        let removed = self.data.len();
        self.data.clear();
        removed
    }

    pub fn watch_index(&self) -> &WatchIndex {
        &self.watch
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}
