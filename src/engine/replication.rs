//! Replication role state.
//!
//! The transaction engine only needs to know two things: whether we are
//! currently a primary (replication frames flow only from primaries) and
//! whether a read-only replica must refuse write batches. Role changes
//! take effect immediately, including between two commands of an EXEC
//! drain when REPLICAOF was queued inside the batch.

use tracing::info;

pub struct ReplicationRole {
    /// `None` while primary; the primary's address once demoted.
    primary_addr: Option<(String, u16)>,
    /// Refuse client writes while acting as a replica.
    pub replica_read_only: bool,
}

impl ReplicationRole {
    pub fn new() -> Self {
        ReplicationRole {
            primary_addr: None,
            replica_read_only: true,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.primary_addr.is_none()
    }

    pub fn primary_addr(&self) -> Option<&(String, u16)> {
        self.primary_addr.as_ref()
    }

    /// REPLICAOF host port: demote to replica of the given primary.
    pub fn set_replica_of(&mut self, host: String, port: u16) {
        info!(host = %host, port, "role change: now a replica");
        self.primary_addr = Some((host, port));
    }

    /// REPLICAOF NO ONE: promote back to primary.
    pub fn set_primary(&mut self) {
        if self.primary_addr.take().is_some() {
            info!("role change: now a primary");
        }
    }
}

impl Default for ReplicationRole {
    fn default() -> Self {
        Self::new()
    }
}
