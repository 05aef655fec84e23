//! Monitor fan-out: passive observers of executed commands.
//!
//! A client that issues MONITOR is registered here and from then on
//! receives one formatted line per executed command, pushed out-of-band
//! through its connection. The feed is suppressed while the server is
//! loading persisted state, and commands flagged SKIP_MONITOR are fed from
//! their own tail (EXEC) or not at all.

use super::session::ClientId;
use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Default)]
pub struct MonitorRegistry {
    clients: Vec<ClientId>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        MonitorRegistry {
            clients: Vec::new(),
        }
    }

    pub fn add(&mut self, id: ClientId) {
        if !self.clients.contains(&id) {
            self.clients.push(id);
        }
    }

    pub fn remove(&mut self, id: ClientId) {
        self.clients.retain(|c| *c != id);
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.clients.iter().copied()
    }
}

/// Format one feed line: `<unix time> [<db> <addr>] "CMD" "arg" ...`
pub fn format_feed_line(db: usize, addr: &str, argv: &[Bytes]) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let mut line = format!("{}.{:06} [{} {}]", now.as_secs(), now.subsec_micros(), db, addr);
    for arg in argv {
        line.push_str(" \"");
        for &byte in arg.iter() {
            match byte {
                b'"' => line.push_str("\\\""),
                b'\\' => line.push_str("\\\\"),
                b'\n' => line.push_str("\\n"),
                b'\r' => line.push_str("\\r"),
                0x20..=0x7e => line.push(byte as char),
                _ => line.push_str(&format!("\\x{:02x}", byte)),
            }
        }
        line.push('"');
    }
    line
}
