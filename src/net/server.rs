//! Accept loop: one tokio task per connection, all sharing one state.

use super::config::ServerConfig;
use super::connection::ConnectionHandler;
use super::shared::SharedState;
use tokio::net::TcpListener;
use tracing::{error, info};

pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Server { config }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let state = SharedState::new();
        state.with_lock(|s| {
            s.role_mut().replica_read_only = self.config.replica_read_only;
            s.enable_replication_backlog();
        });

        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "listening");

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let state = state.clone();
                    tokio::spawn(async move {
                        ConnectionHandler::new(stream, state, addr.to_string())
                            .run()
                            .await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}
