//! String command implementations.
//!
//! All writes go through the `store_*` wrappers so the watch hook fires on
//! every mutation.

use crate::engine::resp::RespValue;
use crate::engine::session::ClientId;
use crate::engine::state::ServerState;
use bytes::Bytes;

/// Shortest round-trip rendering, integer-valued floats without a trailing
/// `.0` (so a counter that happens to be whole reads back as an integer).
fn format_float(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e17 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

impl ServerState {
    pub(crate) fn get(&self, id: ClientId, key: &str) -> RespValue {
        let db_id = self.selected_db(id);
        match self.dbs[db_id].get(key) {
            Some(value) => RespValue::bulk(value.to_vec()),
            None => RespValue::nil(),
        }
    }

    pub(crate) fn set(
        &mut self,
        id: ClientId,
        key: &str,
        value: Bytes,
        nx: bool,
        xx: bool,
    ) -> RespValue {
        let db_id = self.selected_db(id);
        let exists = self.dbs[db_id].contains_key(key);
        if (nx && exists) || (xx && !exists) {
            return RespValue::nil();
        }
        self.store_set(db_id, key, value);
        RespValue::ok()
    }

    pub(crate) fn get_set(&mut self, id: ClientId, key: &str, value: Bytes) -> RespValue {
        let db_id = self.selected_db(id);
        let previous = self.dbs[db_id].get(key).map(|v| v.to_vec());
        self.store_set(db_id, key, value);
        match previous {
            Some(data) => RespValue::bulk(data),
            None => RespValue::nil(),
        }
    }

    pub(crate) fn append(&mut self, id: ClientId, key: &str, suffix: &Bytes) -> RespValue {
        let db_id = self.selected_db(id);
        let mut data = self.dbs[db_id].get(key).map(|v| v.to_vec()).unwrap_or_default();
        data.extend_from_slice(suffix);
        let len = data.len();
        self.store_set(db_id, key, Bytes::from(data));
        RespValue::Integer(len as i64)
    }

    pub(crate) fn str_len(&self, id: ClientId, key: &str) -> RespValue {
        let db_id = self.selected_db(id);
        RespValue::Integer(self.dbs[db_id].get(key).map_or(0, |v| v.len() as i64))
    }

    pub(crate) fn mget(&self, id: ClientId, keys: &[String]) -> RespValue {
        let db_id = self.selected_db(id);
        let values = keys
            .iter()
            .map(|key| match self.dbs[db_id].get(key) {
                Some(value) => RespValue::bulk(value.to_vec()),
                None => RespValue::nil(),
            })
            .collect();
        RespValue::Array(Some(values))
    }

    pub(crate) fn mset(&mut self, id: ClientId, pairs: &[(String, Bytes)]) -> RespValue {
        let db_id = self.selected_db(id);
        for (key, value) in pairs {
            self.store_set(db_id, key, value.clone());
        }
        RespValue::ok()
    }

    pub(crate) fn incr_by(&mut self, id: ClientId, key: &str, delta: i64) -> RespValue {
        let db_id = self.selected_db(id);
        let current = match self.dbs[db_id].get(key) {
            Some(value) => match std::str::from_utf8(value).ok().and_then(|s| s.parse::<i64>().ok())
            {
                Some(n) => n,
                None => {
                    return RespValue::err("ERR value is not an integer or out of range");
                }
            },
            None => 0,
        };
        let Some(next) = current.checked_add(delta) else {
            return RespValue::err("ERR increment or decrement would overflow");
        };
        self.store_set(db_id, key, Bytes::from(next.to_string()));
        RespValue::Integer(next)
    }

    pub(crate) fn incr_by_float(&mut self, id: ClientId, key: &str, delta: f64) -> RespValue {
        let db_id = self.selected_db(id);
        let current = match self.dbs[db_id].get(key) {
            Some(value) => match std::str::from_utf8(value).ok().and_then(|s| s.parse::<f64>().ok())
            {
                Some(n) => n,
                None => return RespValue::err("ERR value is not a valid float"),
            },
            None => 0.0,
        };
        let next = current + delta;
        if next.is_nan() || next.is_infinite() {
            return RespValue::err("ERR increment would produce NaN or Infinity");
        }
        let rendered = format_float(next);
        self.store_set(db_id, key, Bytes::from(rendered.clone()));

        // Propagate the computed result as a plain SET: replaying the
        // float addition downstream could round differently.
        if let Some(session) = self.sessions.get_mut(&id) {
            session.propagate_rewrite = Some(vec![
                Bytes::from_static(b"SET"),
                Bytes::from(key.to_string()),
                Bytes::from(rendered.clone()),
            ]);
        }

        RespValue::bulk(rendered)
    }
}
