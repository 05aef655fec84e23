//! Transaction lifecycle: MULTI, EXEC, DISCARD, WATCH, UNWATCH.
//!
//! The state machine is two states per client (idle / in-multi). Entering
//! MULTI starts buffering; EXEC and DISCARD are the only terminal
//! transitions and both funnel through `discard_transaction`, so every
//! exit path releases the queue, clears both dirty bits and unwatches
//! everything. Client disconnect reuses the same teardown.

use super::command::{Command, CommandFlags};
use super::propagate::PropagationTargets;
use super::resp::RespValue;
use super::session::{ClientId, QueuedCommand};
use bytes::Bytes;
use tracing::debug;

/// Raw terminator appended to the replication backlog when the server is
/// demoted in the middle of a drain: the block's MULTI already reached the
/// backlog, and a well-formed stream must close it.
const EXEC_FRAME: &[u8] = b"*1\r\n$4\r\nEXEC\r\n";

impl super::state::ServerState {
    pub(crate) fn cmd_multi(&mut self, id: ClientId) -> RespValue {
        let Some(session) = self.sessions.get_mut(&id) else {
            return RespValue::err("ERR unknown client");
        };
        if session.in_multi {
            return RespValue::err("ERR MULTI calls can not be nested");
        }
        session.in_multi = true;
        session.queue.clear();
        session.queued_flags = CommandFlags::empty();
        // dirty_cas deliberately survives MULTI entry: a modification that
        // landed between WATCH and MULTI still cancels the transaction.
        debug!(client = %id, "transaction opened");
        RespValue::ok()
    }

    /// Buffer one command while in MULTI. The argument vector is retained
    /// as queued (each element's refcount bumped); flags are OR-folded for
    /// the EXEC-time role gate.
    pub(crate) fn queue_command(
        &mut self,
        id: ClientId,
        cmd: Command,
        argv: Vec<Bytes>,
    ) -> RespValue {
        let Some(session) = self.sessions.get_mut(&id) else {
            return RespValue::err("ERR unknown client");
        };
        session.queued_flags |= cmd.flags();
        session.queue.push(QueuedCommand { cmd, argv });
        RespValue::queued()
    }

    pub(crate) fn cmd_discard(&mut self, id: ClientId) -> RespValue {
        let Some(session) = self.sessions.get(&id) else {
            return RespValue::err("ERR unknown client");
        };
        if !session.in_multi {
            return RespValue::err("ERR DISCARD without MULTI");
        }
        self.discard_transaction(id);
        RespValue::ok()
    }

    pub(crate) fn cmd_watch(&mut self, id: ClientId, keys: &[String]) -> RespValue {
        let Some(session) = self.sessions.get(&id) else {
            return RespValue::err("ERR unknown client");
        };
        if session.in_multi {
            return RespValue::err("ERR WATCH inside MULTI is not allowed");
        }
        for key in keys {
            self.watch_key(id, key);
        }
        RespValue::ok()
    }

    pub(crate) fn cmd_unwatch(&mut self, id: ClientId) -> RespValue {
        self.unwatch_all_keys(id);
        if let Some(session) = self.sessions.get_mut(&id) {
            session.dirty_cas = false;
        }
        RespValue::ok()
    }

    /// Terminal cleanup shared by EXEC, DISCARD and disconnect: release
    /// the queue, reset both dirty bits, leave multi, unwatch everything.
    pub(crate) fn discard_transaction(&mut self, id: ClientId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.queue.clear();
            session.queued_flags = CommandFlags::empty();
            session.in_multi = false;
            session.dirty_cas = false;
            session.dirty_exec = false;
        }
        self.unwatch_all_keys(id);
    }

    pub(crate) fn cmd_exec(&mut self, id: ClientId) -> RespValue {
        let (in_multi, dirty_exec, dirty_cas, queued_flags, db_at_exec, is_replica_link) =
            match self.sessions.get(&id) {
                Some(s) => (
                    s.in_multi,
                    s.dirty_exec,
                    s.dirty_cas,
                    s.queued_flags,
                    s.db,
                    s.is_replica_link,
                ),
                None => return RespValue::err("ERR unknown client"),
            };

        if !in_multi {
            return RespValue::err("ERR EXEC without MULTI");
        }

        // Abort checks, ordered: queue-time errors outrank the CAS bit.
        // An abort still reaches the monitor tail below.
        if dirty_exec || dirty_cas {
            let reply = if dirty_exec {
                RespValue::err("EXECABORT Transaction discarded because of previous errors.")
            } else {
                RespValue::null_array()
            };
            debug!(client = %id, dirty_exec, "transaction aborted before drain");
            self.discard_transaction(id);
            self.exec_monitor_tail(db_at_exec, id);
            return reply;
        }

        // Role gate: the batch may have been opened while we were primary
        // and the instance demoted since. A read-only replica refuses any
        // batch carrying a write, unless it arrives over the replica link.
        if !self.loading
            && !self.role.is_primary()
            && self.role.replica_read_only
            && !is_replica_link
            && queued_flags.contains(CommandFlags::WRITE)
        {
            self.discard_transaction(id);
            self.exec_monitor_tail(db_at_exec, id);
            return RespValue::err(
                "ERR Transaction contains write commands but instance is \
                 now a read-only replica. EXEC aborted.",
            );
        }

        let was_primary = self.role.is_primary();

        // The batch is committed to run: modifications of previously
        // watched keys can no longer cancel it.
        self.unwatch_all_keys(id);

        let mut entries = match self.sessions.get_mut(&id) {
            Some(s) => std::mem::take(&mut s.queue),
            None => Vec::new(),
        };

        let mut must_propagate = false;
        let mut replies = Vec::with_capacity(entries.len());

        for entry in entries.iter_mut() {
            // Lazy MULTI marker: the first entry that is neither read-only
            // nor admin opens the propagated block. Pure-read batches
            // leave no trace in the WAL or the replication stream.
            if !must_propagate
                && !entry
                    .cmd
                    .flags()
                    .intersects(CommandFlags::READONLY | CommandFlags::ADMIN)
            {
                self.propagate_multi_marker(db_at_exec);
                must_propagate = true;
            }

            let QueuedCommand { cmd, argv } = entry;
            // `call` persists any executor rewrite back into the entry's
            // argv, so downstream consumers observe what actually ran.
            replies.push(self.call(id, cmd, argv));
        }

        // Queue storage is released here; the terminal transition below
        // only resets flags.
        drop(entries);
        self.discard_transaction(id);

        if must_propagate {
            self.dirty += 1;
            // Demoted mid-drain: the normal replication path shut off with
            // the role change, leaving the backlog's MULTI unterminated.
            if was_primary && !self.role.is_primary() && self.propagator.has_backlog() {
                self.propagator.feed_backlog_raw(EXEC_FRAME);
            }
        }

        self.exec_monitor_tail(db_at_exec, id);
        RespValue::Array(Some(replies))
    }

    fn propagate_multi_marker(&mut self, db: usize) {
        let argv = [Bytes::from_static(b"MULTI")];
        self.propagate(
            db,
            &argv,
            PropagationTargets::WAL | PropagationTargets::REPLICATION,
        );
    }

    /// EXEC is flagged SKIP_MONITOR in the generic call path and fed to
    /// monitors from here instead, on every outcome including aborts.
    fn exec_monitor_tail(&mut self, db: usize, id: ClientId) {
        if self.loading || self.monitors.is_empty() {
            return;
        }
        let argv = [Bytes::from_static(b"EXEC")];
        self.feed_monitors(db, id, &argv);
    }
}
