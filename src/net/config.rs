//! Server configuration, loaded from environment variables:
//!
//! - `ATOMKV_BIND`: listen address (default `127.0.0.1:6379`)
//! - `ATOMKV_REPLICA_READ_ONLY`: refuse client writes while a replica
//!   (default `true`)

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub replica_read_only: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "127.0.0.1:6379".to_string(),
            replica_read_only: true,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        ServerConfig {
            bind_addr: std::env::var("ATOMKV_BIND")
                .unwrap_or_else(|_| "127.0.0.1:6379".to_string()),
            replica_read_only: std::env::var("ATOMKV_REPLICA_READ_ONLY")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }
}
