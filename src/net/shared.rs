//! Shared server state behind a single lock.
//!
//! The lock is the scheduler: at any instant at most one command executes,
//! and an EXEC drain happens entirely inside one acquisition. That is the
//! premise that makes the transactional guarantees hold without any
//! per-key locking.

use crate::engine::{ClientId, RespValue, ServerState};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Clone)]
pub struct SharedState {
    inner: Arc<Mutex<ServerState>>,
}

impl SharedState {
    pub fn new() -> Self {
        SharedState {
            inner: Arc::new(Mutex::new(ServerState::new())),
        }
    }

    pub fn with_lock<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ServerState) -> R,
    {
        let mut state = self.inner.lock();
        f(&mut state)
    }

    pub fn connect(&self, addr: &str, push_tx: UnboundedSender<Vec<u8>>) -> ClientId {
        self.with_lock(|state| {
            let id = state.connect_client(addr);
            state.set_push_channel(id, push_tx);
            id
        })
    }

    pub fn disconnect(&self, id: ClientId) {
        self.with_lock(|state| state.disconnect_client(id));
    }

    /// Execute one request. Serial with respect to all other connections.
    pub fn dispatch(&self, id: ClientId, argv: Vec<Bytes>) -> RespValue {
        self.with_lock(|state| state.dispatch(id, argv))
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
