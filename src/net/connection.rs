//! Per-connection handler.
//!
//! Reads RESP requests off the socket, executes them against the shared
//! state, and writes replies. Out-of-band frames (the monitor feed) arrive
//! on the push channel and are interleaved at command boundaries.

use super::shared::SharedState;
use crate::engine::{request_argv, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

pub struct ConnectionHandler {
    stream: TcpStream,
    state: SharedState,
    buffer: BytesMut,
    client_addr: String,
}

impl ConnectionHandler {
    pub fn new(stream: TcpStream, state: SharedState, client_addr: String) -> Self {
        ConnectionHandler {
            stream,
            state,
            buffer: BytesMut::with_capacity(4096),
            client_addr,
        }
    }

    pub async fn run(mut self) {
        info!(addr = %self.client_addr, "client connected");

        let (push_tx, mut push_rx) = mpsc::unbounded_channel();
        let id = self.state.connect(&self.client_addr, push_tx);

        loop {
            tokio::select! {
                pushed = push_rx.recv() => {
                    let Some(frame) = pushed else { break };
                    if self.stream.write_all(&frame).await.is_err() {
                        break;
                    }
                    // Drain whatever else is already queued.
                    if self.flush_push(&mut push_rx).await.is_err() {
                        break;
                    }
                }
                read = self.stream.read_buf(&mut self.buffer) => {
                    match read {
                        Ok(0) => {
                            debug!(addr = %self.client_addr, "client closed connection");
                            break;
                        }
                        Ok(_) => {
                            if self.process_buffered(id).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(addr = %self.client_addr, error = %e, "read failed");
                            break;
                        }
                    }
                }
            }
        }

        self.state.disconnect(id);
        info!(addr = %self.client_addr, "client disconnected");
    }

    async fn flush_push(
        &mut self,
        push_rx: &mut UnboundedReceiver<Vec<u8>>,
    ) -> std::io::Result<()> {
        while let Ok(frame) = push_rx.try_recv() {
            self.stream.write_all(&frame).await?;
        }
        Ok(())
    }

    /// Execute every complete request currently buffered.
    async fn process_buffered(&mut self, id: crate::engine::ClientId) -> std::io::Result<()> {
        loop {
            match RespParser::parse(&self.buffer) {
                Ok(Some((value, consumed))) => {
                    self.buffer.advance(consumed);
                    let reply = match request_argv(&value) {
                        Ok(argv) => self.state.dispatch(id, argv),
                        Err(e) => {
                            warn!(addr = %self.client_addr, error = %e, "bad request");
                            RespValue::Error(format!("ERR {}", e))
                        }
                    };
                    self.stream.write_all(&RespParser::encode(&reply)).await?;
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    // Malformed stream: reply once, then drop the connection.
                    warn!(addr = %self.client_addr, error = %e, "protocol error");
                    let reply = RespValue::Error(format!("ERR protocol error: {}", e));
                    self.stream.write_all(&RespParser::encode(&reply)).await?;
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "protocol error",
                    ));
                }
            }
        }
    }
}
