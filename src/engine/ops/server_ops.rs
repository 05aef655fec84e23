//! Connection and admin command implementations.

use crate::engine::resp::RespValue;
use crate::engine::session::ClientId;
use crate::engine::state::ServerState;
use bytes::Bytes;

impl ServerState {
    pub(crate) fn ping(&self, msg: Option<&Bytes>) -> RespValue {
        match msg {
            Some(msg) => RespValue::bulk(msg.to_vec()),
            None => RespValue::simple("PONG"),
        }
    }

    pub(crate) fn select(&mut self, id: ClientId, index: usize) -> RespValue {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.db = index;
        }
        RespValue::ok()
    }

    pub(crate) fn db_size(&self, id: ClientId) -> RespValue {
        let db_id = self.selected_db(id);
        RespValue::Integer(self.dbs[db_id].len() as i64)
    }

    pub(crate) fn replica_of(&mut self, target: Option<(String, u16)>) -> RespValue {
        match target {
            Some((host, port)) => self.role.set_replica_of(host, port),
            None => self.role.set_primary(),
        }
        RespValue::ok()
    }

    pub(crate) fn cmd_monitor(&mut self, id: ClientId) -> RespValue {
        if self.sessions.contains_key(&id) {
            self.monitors.add(id);
        }
        RespValue::ok()
    }
}
