//! Key command implementations.

use crate::engine::resp::RespValue;
use crate::engine::session::ClientId;
use crate::engine::state::ServerState;

impl ServerState {
    pub(crate) fn del(&mut self, id: ClientId, keys: &[String]) -> RespValue {
        let db_id = self.selected_db(id);
        let mut removed = 0;
        for key in keys {
            if self.store_delete(db_id, key) {
                removed += 1;
            }
        }
        RespValue::Integer(removed)
    }

    pub(crate) fn exists(&self, id: ClientId, keys: &[String]) -> RespValue {
        let db_id = self.selected_db(id);
        let count = keys
            .iter()
            .filter(|key| self.dbs[db_id].contains_key(key))
            .count();
        RespValue::Integer(count as i64)
    }

    pub(crate) fn type_of(&self, id: ClientId, key: &str) -> RespValue {
        let db_id = self.selected_db(id);
        if self.dbs[db_id].contains_key(key) {
            RespValue::simple("string")
        } else {
            RespValue::simple("none")
        }
    }

    pub(crate) fn flush_db(&mut self, id: ClientId) -> RespValue {
        let db_id = self.selected_db(id);
        self.store_flush(Some(db_id));
        RespValue::ok()
    }

    pub(crate) fn flush_all(&mut self) -> RespValue {
        self.store_flush(None);
        RespValue::ok()
    }
}
