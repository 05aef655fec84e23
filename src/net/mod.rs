//! TCP front-end: accept loop, per-connection handlers, shared state.

mod config;
mod connection;
mod server;
mod shared;

pub use config::ServerConfig;
pub use server::Server;
pub use shared::SharedState;
