// src/transport/tcp.rs

//! Newline-delimited JSON transport over TCP.
//!
//! Each line from the router is a [`WireEnvelope`](crate::protocol::WireEnvelope);
//! each line to the router is one serialized [`OutboundMessage`]. A background
//! task owns the socket, reconnects after `reconnect_delay` when the router
//! goes away, and keeps up to [`OUTBOUND_QUEUE`] outbound messages queued
//! while disconnected. Past that, new messages are dropped; `send` never
//! waits on the socket.

use std::future::Future;
use std::pin::Pin;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::TransportSettings;
use crate::engine::RuntimeEvent;
use crate::errors::{Result, TaskRunnerError};
use crate::protocol::{decode_wire_line, OutboundMessage};

use super::Transport;

/// Outbound messages held while the router is slow or unreachable.
pub const OUTBOUND_QUEUE: usize = 256;

pub struct TcpTransport {
    outbound_tx: mpsc::Sender<OutboundMessage>,
    handle: JoinHandle<()>,
}

impl TcpTransport {
    /// Start the connection task. Inbound envelopes are forwarded to
    /// `runtime_tx`.
    pub fn spawn(settings: TransportSettings, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE);
        let handle = tokio::spawn(connection_loop(settings, runtime_tx, outbound_rx));
        Self {
            outbound_tx,
            handle,
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl Transport for TcpTransport {
    fn send(
        &mut self,
        message: OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let result = match self.outbound_tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                warn!(
                    subject = %message.subject(),
                    queued = OUTBOUND_QUEUE,
                    "outbound queue full, dropping message"
                );
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(TaskRunnerError::Transport(
                "connection task has stopped".to_string(),
            )),
        };

        Box::pin(std::future::ready(result))
    }
}

enum ConnectionEnd {
    RouterClosed,
    OutboundClosed,
    RuntimeGone,
}

async fn connection_loop(
    settings: TransportSettings,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    mut outbound_rx: mpsc::Receiver<OutboundMessage>,
) {
    loop {
        match TcpStream::connect(&settings.router).await {
            Ok(stream) => {
                info!(router = %settings.router, "connected to router");
                match serve_connection(stream, &runtime_tx, &mut outbound_rx).await {
                    Ok(ConnectionEnd::RouterClosed) => {
                        warn!(router = %settings.router, "router closed the connection");
                    }
                    Ok(ConnectionEnd::OutboundClosed) | Ok(ConnectionEnd::RuntimeGone) => {
                        info!("transport shutting down");
                        return;
                    }
                    Err(e) => {
                        warn!(router = %settings.router, error = %e, "router connection failed");
                    }
                }
            }
            Err(e) => {
                warn!(router = %settings.router, error = %e, "cannot connect to router");
            }
        }

        debug!(delay = ?settings.reconnect_delay, "reconnecting after delay");
        sleep(settings.reconnect_delay).await;
    }
}

async fn serve_connection(
    stream: TcpStream,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    outbound_rx: &mut mpsc::Receiver<OutboundMessage>,
) -> anyhow::Result<ConnectionEnd> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading from router")? else {
                    return Ok(ConnectionEnd::RouterClosed);
                };
                if line.trim().is_empty() {
                    continue;
                }
                match decode_wire_line(&line) {
                    Ok(envelope) => {
                        if runtime_tx.send(RuntimeEvent::Inbound(envelope)).await.is_err() {
                            return Ok(ConnectionEnd::RuntimeGone);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, line = %line, "dropping malformed frame");
                    }
                }
            }
            msg = outbound_rx.recv() => {
                let Some(msg) = msg else {
                    return Ok(ConnectionEnd::OutboundClosed);
                };
                let line = msg.to_json_line().context("encoding outbound message")?;
                writer
                    .write_all(line.as_bytes())
                    .await
                    .with_context(|| format!("sending {} to router", msg.subject()))?;
            }
        }
    }
}
