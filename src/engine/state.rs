//! The server state machine: sessions, keyspace, role, and the command
//! call path.
//!
//! All commands, direct or drained out of a MULTI queue, run through
//! `call`, which feeds monitors before execution and propagates the
//! command's effective argv afterwards when the keyspace changed. The
//! surrounding lock (see `net::SharedState`) makes each `dispatch`
//! invocation atomic with respect to every other connection, which is the
//! whole basis of the transactional guarantee: an EXEC drain is a single
//! `dispatch`.

use super::command::{Command, CommandFlags};
use super::db::{Db, NUM_DATABASES};
use super::monitor::{self, MonitorRegistry};
use super::propagate::{PropagationTargets, Propagator};
use super::replication::ReplicationRole;
use super::resp::{RespParser, RespValue};
use super::session::{ClientId, Session};
use ahash::AHashMap;
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

pub struct ServerState {
    pub(crate) dbs: Vec<Db>,
    pub(crate) sessions: AHashMap<ClientId, Session>,
    next_client_id: u64,
    pub(crate) role: ReplicationRole,
    /// True while replaying persisted state; suppresses the monitor feed
    /// and the read-only-replica gate.
    pub(crate) loading: bool,
    /// Count of keyspace changes since startup. The call path snapshots it
    /// around execution to decide whether a command propagates.
    pub(crate) dirty: u64,
    pub(crate) propagator: Propagator,
    pub(crate) monitors: MonitorRegistry,
}

impl ServerState {
    pub fn new() -> Self {
        ServerState {
            dbs: (0..NUM_DATABASES).map(|_| Db::new()).collect(),
            sessions: AHashMap::new(),
            next_client_id: 1,
            role: ReplicationRole::new(),
            loading: false,
            dirty: 0,
            propagator: Propagator::new(),
            monitors: MonitorRegistry::new(),
        }
    }

    // =========================================================================
    // Client lifecycle
    // =========================================================================

    pub fn connect_client(&mut self, addr: &str) -> ClientId {
        let id = ClientId(self.next_client_id);
        self.next_client_id += 1;
        self.sessions.insert(id, Session::new(id, addr.to_string()));
        debug!(client = %id, addr, "session created");
        id
    }

    /// Disconnect teardown: identical to DISCARD's cleanup, plus release
    /// of the session itself. Must run before the handle is forgotten so
    /// the watch index never holds a dead client.
    pub fn disconnect_client(&mut self, id: ClientId) {
        self.unwatch_all_keys(id);
        self.monitors.remove(id);
        self.sessions.remove(&id);
        debug!(client = %id, "session destroyed");
    }

    /// Attach the out-of-band push channel for monitor feed delivery.
    pub fn set_push_channel(&mut self, id: ClientId, tx: UnboundedSender<Vec<u8>>) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.push_tx = Some(tx);
        }
    }

    /// Mark a session as the replication channel from our primary. Its
    /// writes bypass the read-only-replica gate.
    pub fn mark_replica_link(&mut self, id: ClientId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.is_replica_link = true;
        }
    }

    pub fn session(&self, id: ClientId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub(crate) fn selected_db(&self, id: ClientId) -> usize {
        self.sessions.get(&id).map_or(0, |s| s.db)
    }

    pub fn client_count(&self) -> usize {
        self.sessions.len()
    }

    // =========================================================================
    // Command dispatch
    // =========================================================================

    /// Entry point for one wire request.
    pub fn dispatch(&mut self, id: ClientId, mut argv: Vec<Bytes>) -> RespValue {
        let cmd = match Command::parse(&argv) {
            Ok(cmd) => cmd,
            Err(e) => {
                // A queuing-time error taints the open transaction: the
                // eventual EXEC aborts instead of running a partial batch.
                if let Some(session) = self.sessions.get_mut(&id) {
                    if session.in_multi {
                        session.dirty_exec = true;
                    }
                }
                return RespValue::Error(e);
            }
        };

        let Some(session) = self.sessions.get(&id) else {
            return RespValue::err("ERR unknown client");
        };

        if session.in_multi && !cmd.is_transaction_control() {
            return self.queue_command(id, cmd, argv);
        }

        // Direct writes are refused on a read-only replica; queued writes
        // are handled by the equivalent gate at EXEC time.
        if cmd.flags().contains(CommandFlags::WRITE)
            && !self.loading
            && !self.role.is_primary()
            && self.role.replica_read_only
            && !session.is_replica_link
        {
            return RespValue::err("READONLY You can't write against a read only replica.");
        }

        self.call(id, &cmd, &mut argv)
    }

    /// Execute one resolved command: monitor feed, executor, propagation.
    ///
    /// The executor may rewrite the frame it wants propagated (see
    /// `Session::propagate_rewrite`); the rewrite is persisted into `argv`
    /// so callers holding queued entries observe what actually executed.
    pub(crate) fn call(&mut self, id: ClientId, cmd: &Command, argv: &mut Vec<Bytes>) -> RespValue {
        let Some(session) = self.sessions.get(&id) else {
            return RespValue::err("ERR unknown client");
        };
        let db_id = session.db;
        let flags = cmd.flags();

        if !self.loading
            && !self.monitors.is_empty()
            && !flags.contains(CommandFlags::SKIP_MONITOR)
        {
            self.feed_monitors(db_id, id, argv);
        }

        let dirty_before = self.dirty;
        let reply = self.execute(id, cmd);

        if let Some(rewrite) = self
            .sessions
            .get_mut(&id)
            .and_then(|s| s.propagate_rewrite.take())
        {
            *argv = rewrite;
        }

        if self.dirty > dirty_before {
            self.propagate(
                db_id,
                argv,
                PropagationTargets::WAL | PropagationTargets::REPLICATION,
            );
        }

        reply
    }

    /// Descriptor -> executor dispatch.
    pub(crate) fn execute(&mut self, id: ClientId, cmd: &Command) -> RespValue {
        match cmd {
            Command::Ping(msg) => self.ping(msg.as_ref()),
            Command::Echo(msg) => RespValue::bulk(msg.to_vec()),
            Command::Select(index) => self.select(id, *index),
            Command::DbSize => self.db_size(id),
            Command::Get(key) => self.get(id, key),
            Command::Set { key, value, nx, xx } => self.set(id, key, value.clone(), *nx, *xx),
            Command::GetSet(key, value) => self.get_set(id, key, value.clone()),
            Command::Append(key, value) => self.append(id, key, value),
            Command::StrLen(key) => self.str_len(id, key),
            Command::MGet(keys) => self.mget(id, keys),
            Command::MSet(pairs) => self.mset(id, pairs),
            Command::Incr(key) => self.incr_by(id, key, 1),
            Command::Decr(key) => self.incr_by(id, key, -1),
            Command::IncrBy(key, delta) => self.incr_by(id, key, *delta),
            Command::DecrBy(key, delta) => match delta.checked_neg() {
                Some(neg) => self.incr_by(id, key, neg),
                None => RespValue::err("ERR decrement would overflow"),
            },
            Command::IncrByFloat(key, delta) => self.incr_by_float(id, key, *delta),
            Command::Del(keys) => self.del(id, keys),
            Command::Exists(keys) => self.exists(id, keys),
            Command::TypeOf(key) => self.type_of(id, key),
            Command::FlushDb => self.flush_db(id),
            Command::FlushAll => self.flush_all(),
            Command::Multi => self.cmd_multi(id),
            Command::Exec => self.cmd_exec(id),
            Command::Discard => self.cmd_discard(id),
            Command::Watch(keys) => self.cmd_watch(id, keys),
            Command::Unwatch => self.cmd_unwatch(id),
            Command::ReplicaOf(target) => self.replica_of(target.clone()),
            Command::Monitor => self.cmd_monitor(id),
        }
    }

    // =========================================================================
    // Store access with the modification hook
    // =========================================================================
    //
    // Every write path funnels through these wrappers so the watch touch
    // fires before the command reports success. Bypassing them would break
    // the optimistic-concurrency contract.

    pub(crate) fn store_set(&mut self, db_id: usize, key: &str, value: Bytes) {
        self.dbs[db_id].insert(key, value);
        self.touch_watched_key(db_id, key);
        self.dirty += 1;
    }

    pub(crate) fn store_delete(&mut self, db_id: usize, key: &str) -> bool {
        if self.dbs[db_id].remove(key) {
            self.touch_watched_key(db_id, key);
            self.dirty += 1;
            true
        } else {
            false
        }
    }

    /// Flush one database or all of them. Watchers of keys that exist at
    /// flush time are tainted first; the watch indexes themselves survive.
    pub(crate) fn store_flush(&mut self, db_id: Option<usize>) -> usize {
        self.touch_watched_keys_on_flush(db_id);
        let removed = match db_id {
            Some(index) => self.dbs[index].clear(),
            None => self.dbs.iter_mut().map(Db::clear).sum(),
        };
        self.dirty += removed as u64;
        removed
    }

    // =========================================================================
    // Propagation and monitors
    // =========================================================================

    /// Deliver a frame downstream. The replication stream only flows from
    /// a primary; the WAL is fed regardless of role.
    pub(crate) fn propagate(
        &mut self,
        db: usize,
        argv: &[Bytes],
        mut targets: PropagationTargets,
    ) {
        if !self.role.is_primary() {
            targets.remove(PropagationTargets::REPLICATION);
        }
        if targets.is_empty() {
            return;
        }
        self.propagator.propagate(db, argv, targets);
    }

    pub(crate) fn feed_monitors(&self, db: usize, source: ClientId, argv: &[Bytes]) {
        if self.monitors.is_empty() {
            return;
        }
        let source_addr = self
            .sessions
            .get(&source)
            .map(|s| s.addr.as_str())
            .unwrap_or("?:0");
        let line = monitor::format_feed_line(db, source_addr, argv);
        let frame = RespParser::encode(&RespValue::SimpleString(line));
        for mid in self.monitors.iter() {
            if let Some(tx) = self.sessions.get(&mid).and_then(|s| s.push_tx.as_ref()) {
                let _ = tx.send(frame.clone());
            }
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn db(&self, index: usize) -> &Db {
        &self.dbs[index]
    }

    pub fn role(&self) -> &ReplicationRole {
        &self.role
    }

    pub fn role_mut(&mut self) -> &mut ReplicationRole {
        &mut self.role
    }

    pub fn dirty_counter(&self) -> u64 {
        self.dirty
    }

    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    pub fn enable_replication_backlog(&mut self) {
        self.propagator.ensure_backlog();
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}
