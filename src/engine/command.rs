//! Command descriptors.
//!
//! `Command` is the resolved form of a client request: the dispatcher parses
//! a raw argument vector into one of these (see `parser.rs`) and the
//! executor consumes it. Each descriptor carries a flag set used by the
//! transaction engine: flag aggregation over a queued batch decides the
//! read-only-replica gate, and the READONLY/ADMIN bits decide when the
//! synthetic `MULTI` marker is propagated.

use bitflags::bitflags;
use bytes::Bytes;

bitflags! {
    /// Descriptor flags, OR-folded into `Session::queued_flags` at queue time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommandFlags: u8 {
        /// May modify the keyspace. A replica with replica-read-only set
        /// refuses an EXEC whose batch carries this bit.
        const WRITE = 1 << 0;
        /// Never modifies the keyspace. Read-only commands do not trigger
        /// the propagated `MULTI` marker.
        const READONLY = 1 << 1;
        /// Server administration. Admin commands do not trigger the marker
        /// either, even though they are not read-only.
        const ADMIN = 1 << 2;
        /// Excluded from the monitor fan-out in the generic call path.
        /// EXEC is fed to monitors from its own tail instead.
        const SKIP_MONITOR = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Connection
    Ping(Option<Bytes>),
    Echo(Bytes),
    Select(usize),
    DbSize,
    // Strings
    Get(String),
    Set {
        key: String,
        value: Bytes,
        nx: bool,
        xx: bool,
    },
    GetSet(String, Bytes),
    Append(String, Bytes),
    StrLen(String),
    MGet(Vec<String>),
    MSet(Vec<(String, Bytes)>),
    Incr(String),
    Decr(String),
    IncrBy(String, i64),
    DecrBy(String, i64),
    IncrByFloat(String, f64),
    // Keys
    Del(Vec<String>),
    Exists(Vec<String>),
    TypeOf(String),
    FlushDb,
    FlushAll,
    // Transactions
    Multi,
    Exec,
    Discard,
    Watch(Vec<String>),
    Unwatch,
    // Admin
    ReplicaOf(Option<(String, u16)>),
    Monitor,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(_) => "PING",
            Command::Echo(_) => "ECHO",
            Command::Select(_) => "SELECT",
            Command::DbSize => "DBSIZE",
            Command::Get(_) => "GET",
            Command::Set { .. } => "SET",
            Command::GetSet(..) => "GETSET",
            Command::Append(..) => "APPEND",
            Command::StrLen(_) => "STRLEN",
            Command::MGet(_) => "MGET",
            Command::MSet(_) => "MSET",
            Command::Incr(_) => "INCR",
            Command::Decr(_) => "DECR",
            Command::IncrBy(..) => "INCRBY",
            Command::DecrBy(..) => "DECRBY",
            Command::IncrByFloat(..) => "INCRBYFLOAT",
            Command::Del(_) => "DEL",
            Command::Exists(_) => "EXISTS",
            Command::TypeOf(_) => "TYPE",
            Command::FlushDb => "FLUSHDB",
            Command::FlushAll => "FLUSHALL",
            Command::Multi => "MULTI",
            Command::Exec => "EXEC",
            Command::Discard => "DISCARD",
            Command::Watch(_) => "WATCH",
            Command::Unwatch => "UNWATCH",
            Command::ReplicaOf(_) => "REPLICAOF",
            Command::Monitor => "MONITOR",
        }
    }

    pub fn flags(&self) -> CommandFlags {
        match self {
            Command::Set { .. }
            | Command::GetSet(..)
            | Command::Append(..)
            | Command::MSet(_)
            | Command::Incr(_)
            | Command::Decr(_)
            | Command::IncrBy(..)
            | Command::DecrBy(..)
            | Command::IncrByFloat(..)
            | Command::Del(_)
            | Command::FlushDb
            | Command::FlushAll => CommandFlags::WRITE,

            Command::Ping(_)
            | Command::Echo(_)
            | Command::Select(_)
            | Command::DbSize
            | Command::Get(_)
            | Command::StrLen(_)
            | Command::MGet(_)
            | Command::Exists(_)
            | Command::TypeOf(_) => CommandFlags::READONLY,

            Command::ReplicaOf(_) | Command::Monitor => CommandFlags::ADMIN,

            Command::Multi
            | Command::Exec
            | Command::Discard
            | Command::Watch(_)
            | Command::Unwatch => CommandFlags::SKIP_MONITOR,
        }
    }

    /// The transaction-control set. These execute immediately even while a
    /// MULTI is open; everything else is queued instead.
    pub fn is_transaction_control(&self) -> bool {
        matches!(
            self,
            Command::Multi
                | Command::Exec
                | Command::Discard
                | Command::Watch(_)
                | Command::Unwatch
        )
    }
}
