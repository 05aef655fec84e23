//! The transactional execution core.
//!
//! - `resp.rs`: wire value model, parser, encoder
//! - `command.rs` / `parser.rs`: command descriptors and resolution
//! - `session.rs`: per-client transaction state
//! - `watch.rs`: bidirectional watcher index and touch hooks
//! - `db.rs`: the keyspace
//! - `state.rs`: `ServerState` and the dispatch/call path
//! - `exec.rs`: MULTI/EXEC/DISCARD/WATCH/UNWATCH and the drain engine
//! - `ops/`: plain command implementations
//! - `propagate.rs`: WAL and replication sinks, backlog
//! - `replication.rs`: role state
//! - `monitor.rs`: observer fan-out
//! - `transaction_dst.rs`: seeded simulation harness

mod command;
mod db;
mod exec;
mod monitor;
mod ops;
mod parser;
mod propagate;
mod replication;
mod resp;
mod session;
mod state;
mod transaction_dst;
mod watch;

#[cfg(test)]
mod tests;

pub use command::{Command, CommandFlags};
pub use db::{Db, NUM_DATABASES};
pub use monitor::MonitorRegistry;
pub use propagate::{PropagatedFrame, PropagationTargets, Propagator, ReplBacklog};
pub use replication::ReplicationRole;
pub use resp::{encode_command_frame, request_argv, RespParser, RespValue};
pub use session::{ClientId, QueuedCommand, Session, WatchedKey};
pub use state::ServerState;
pub use transaction_dst::{
    run_transaction_batch, summarize_transaction_batch, TransactionDstConfig,
    TransactionDstHarness, TransactionDstResult,
};
pub use watch::WatchIndex;
