//! Reverse half of the watcher relation: key -> watching clients.
//!
//! One `WatchIndex` per database. The store's mutation hook has to locate
//! watchers in expected O(1) on the key, so the index is a hash map; the
//! per-key client list preserves insertion order (O(1) append, O(len)
//! removal of a known client), which keeps tests deterministic.
//!
//! The index never maps a key to an empty client list: the last removal
//! prunes the entry and drops its key reference.

use super::session::{ClientId, WatchedKey};
use ahash::AHashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct WatchIndex {
    keys: AHashMap<Arc<str>, Vec<ClientId>>,
}

impl WatchIndex {
    pub fn new() -> Self {
        WatchIndex {
            keys: AHashMap::new(),
        }
    }

    /// Register `client` as a watcher of `key` and return the shared key
    /// name for the client's forward list. The caller guarantees the pair
    /// is not already present (dedup happens against the forward list).
    pub(crate) fn add(&mut self, key: &str, client: ClientId) -> Arc<str> {
        match self.keys.get_key_value(key).map(|(k, _)| Arc::clone(k)) {
            Some(shared) => {
                if let Some(clients) = self.keys.get_mut(key) {
                    clients.push(client);
                }
                shared
            }
            None => {
                let shared: Arc<str> = Arc::from(key);
                self.keys.insert(Arc::clone(&shared), vec![client]);
                shared
            }
        }
    }

    /// Remove `client` from `key`'s watcher list, pruning the entry when
    /// the list empties.
    pub(crate) fn remove(&mut self, key: &str, client: ClientId) {
        if let Some(clients) = self.keys.get_mut(key) {
            clients.retain(|c| *c != client);
            if clients.is_empty() {
                self.keys.remove(key);
            }
        }
    }

    /// The clients currently watching `key`, in watch order.
    pub fn watchers(&self, key: &str) -> Option<&[ClientId]> {
        self.keys.get(key).map(|v| v.as_slice())
    }

    pub fn watched_key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The index's own reference to a key name, if watched. Exposed so
    /// tests can assert reference-count balance.
    pub fn key_name(&self, key: &str) -> Option<Arc<str>> {
        self.keys.get_key_value(key).map(|(k, _)| Arc::clone(k))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &[ClientId])> {
        self.keys.iter().map(|(k, v)| (k, v.as_slice()))
    }
}

// =============================================================================
// Watcher maintenance on the server state
// =============================================================================
//
// Both halves of the relation are updated together here, which is what
// keeps them consistent: the per-key client lists in each database's
// `WatchIndex`, and the per-client `watched` forward lists.

impl super::state::ServerState {
    /// WATCH one key for a client in its selected database. Watching the
    /// same `(db, key)` twice is a no-op; the duplicate check compares key
    /// bytes against the client's forward list.
    pub(crate) fn watch_key(&mut self, id: ClientId, key: &str) {
        let db_id = match self.sessions.get(&id) {
            Some(s) if s.is_watching(s.db, key) => return,
            Some(s) => s.db,
            None => return,
        };
        let shared = self.dbs[db_id].watch.add(key, id);
        if let Some(session) = self.sessions.get_mut(&id) {
            session.watched.push(WatchedKey {
                db: db_id,
                key: shared,
            });
        }
    }

    /// Remove every watch held by `id`. Each removal drops the forward
    /// list's key reference and, via index pruning, the reverse side's
    /// reference when the client was the last watcher.
    pub(crate) fn unwatch_all_keys(&mut self, id: ClientId) {
        let watched = match self.sessions.get_mut(&id) {
            Some(session) => std::mem::take(&mut session.watched),
            None => return,
        };
        for wk in watched {
            self.dbs[wk.db].watch.remove(&wk.key, id);
        }
    }

    /// The store-side modification hook: taint every client watching
    /// `(db, key)`, including the client doing the writing. No structural
    /// change to the index.
    pub(crate) fn touch_watched_key(&mut self, db_id: usize, key: &str) {
        let watchers: Vec<ClientId> = match self.dbs[db_id].watch.watchers(key) {
            Some(w) if !w.is_empty() => w.to_vec(),
            _ => return,
        };
        for watcher in watchers {
            if let Some(session) = self.sessions.get_mut(&watcher) {
                session.dirty_cas = true;
            }
        }
    }

    /// Flush-time variant, called before the flush empties the data: only
    /// watched keys that currently exist taint their watchers, so flushing
    /// nothing a watcher cared about cancels nothing.
    pub(crate) fn touch_watched_keys_on_flush(&mut self, db_id: Option<usize>) {
        let mut tainted: Vec<ClientId> = Vec::new();
        for (id, session) in self.sessions.iter() {
            let hit = session.watched.iter().any(|wk| {
                db_id.map_or(true, |flushed| flushed == wk.db)
                    && self.dbs[wk.db].contains_key(&wk.key)
            });
            if hit {
                tainted.push(*id);
            }
        }
        for id in tainted {
            if let Some(session) = self.sessions.get_mut(&id) {
                session.dirty_cas = true;
            }
        }
    }
}
