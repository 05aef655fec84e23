//! Per-client session state.
//!
//! A `Session` owns everything the transaction engine tracks for one
//! connection: the MULTI buffer, the two dirty bits, and the forward list
//! of watched keys. All of it is torn down on every terminal transition
//! (EXEC, DISCARD, disconnect) so a session outside a transaction is
//! indistinguishable from a fresh one.

use super::command::{Command, CommandFlags};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Stable client handle. Ids are allocated from a monotonic counter and
/// never reused within a server's lifetime, so a stale id in the watch
/// index can never alias a newer client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// One entry of the MULTI buffer: the resolved descriptor plus the raw
/// argument vector it was queued with. `Bytes` clones are refcount bumps,
/// so queuing holds its own reference to every argument.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub cmd: Command,
    pub argv: Vec<Bytes>,
}

/// Forward half of the watcher relation: a `(db, key)` pair this client is
/// watching. The `Arc<str>` is shared with the per-database watch index.
#[derive(Debug, Clone)]
pub struct WatchedKey {
    pub db: usize,
    pub key: Arc<str>,
}

pub struct Session {
    pub(crate) id: ClientId,
    /// Peer address, for log lines and the monitor feed.
    pub(crate) addr: String,
    /// Currently selected database.
    pub(crate) db: usize,
    pub(crate) in_multi: bool,
    /// A watched key was modified since WATCH. Only UNWATCH-all clears it;
    /// in particular MULTI does not, so a modification landing between
    /// WATCH and MULTI still cancels the transaction.
    pub(crate) dirty_cas: bool,
    /// A command failed resolution while queuing; EXEC must abort.
    pub(crate) dirty_exec: bool,
    pub(crate) queue: Vec<QueuedCommand>,
    /// OR-fold of descriptor flags over `queue`.
    pub(crate) queued_flags: CommandFlags,
    pub(crate) watched: Vec<WatchedKey>,
    /// Set on the connection that links us to our primary; its writes
    /// bypass the read-only-replica gate.
    pub(crate) is_replica_link: bool,
    /// Out-of-band frames (monitor feed) are pushed here; the connection
    /// task drains the other end.
    pub(crate) push_tx: Option<UnboundedSender<Vec<u8>>>,
    /// Set by an executor that wants a different argv propagated than the
    /// one it was invoked with (e.g. INCRBYFLOAT propagating a plain SET).
    pub(crate) propagate_rewrite: Option<Vec<Bytes>>,
}

impl Session {
    pub(crate) fn new(id: ClientId, addr: String) -> Self {
        Session {
            id,
            addr,
            db: 0,
            in_multi: false,
            dirty_cas: false,
            dirty_exec: false,
            queue: Vec::new(),
            queued_flags: CommandFlags::empty(),
            watched: Vec::new(),
            is_replica_link: false,
            push_tx: None,
            propagate_rewrite: None,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn selected_db(&self) -> usize {
        self.db
    }

    pub fn in_multi(&self) -> bool {
        self.in_multi
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn watched_keys(&self) -> &[WatchedKey] {
        &self.watched
    }

    pub fn is_dirty_cas(&self) -> bool {
        self.dirty_cas
    }

    pub fn is_dirty_exec(&self) -> bool {
        self.dirty_exec
    }

    pub fn queued_flags(&self) -> CommandFlags {
        self.queued_flags
    }

    /// Whether this client has already watched `(db, key)`. Comparison is
    /// by key bytes, not pointer identity.
    pub(crate) fn is_watching(&self, db: usize, key: &str) -> bool {
        self.watched.iter().any(|wk| wk.db == db && &*wk.key == key)
    }
}
