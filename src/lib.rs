pub mod engine;
pub mod net;

pub use engine::{ClientId, Command, RespParser, RespValue, ServerState};
pub use net::{Server, ServerConfig, SharedState};
