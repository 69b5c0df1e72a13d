//! Inbound event socket server

use crate::{AgentRegistry, CorrelationRegistry, EventBus, Result};
use hookwire_proto::{decode, Envelope, EventKind, FrameReader};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Literal acknowledgement written before the connection is closed
pub const ACK: &[u8] = b"HTTP/1.1 200 OK";

/// Routes decoded envelopes to correlation, agent tracking and the bus
pub struct Dispatcher {
    bus: Arc<EventBus>,
    agents: Arc<AgentRegistry>,
    correlation: Arc<CorrelationRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over shared components
    pub fn new(bus: Arc<EventBus>, agents: Arc<AgentRegistry>, correlation: Arc<CorrelationRegistry>) -> Self {
        Self {
            bus,
            agents,
            correlation,
        }
    }

    /// Route one envelope
    ///
    /// Envelopes with a trace go to correlation only. Otherwise connect and
    /// disconnect signals update the agent registry, and typed envelopes
    /// are published.
    pub async fn dispatch(&self, envelope: Envelope) {
        if let Some(trace) = envelope.trace.clone() {
            self.correlation.resolve(&trace, envelope).await;
            return;
        }

        match envelope.kind {
            Some(EventKind::Connect) => match envelope.pid() {
                Some(pid) => {
                    self.agents.on_connect(envelope.client_id, pid).await;
                }
                None => warn!("Connect event from client {} without pid", envelope.client_id),
            },
            Some(_) => {}
            None => {
                if envelope.is_disconnect() {
                    self.agents.on_disconnect(envelope.client_id).await;
                } else {
                    debug!("Ignoring untyped envelope from client {}: {:?}", envelope.client_id, envelope.status());
                }
                return;
            }
        }

        self.bus.publish(&envelope).await;
    }
}

/// TCP server accepting one frame per connection
pub struct EventListener {
    listener: TcpListener,
    reader_limit: usize,
}

impl EventListener {
    /// Bind the listener
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            reader_limit: hookwire_proto::codec::MAX_FRAME_SIZE,
        })
    }

    /// Cap the size of a single inbound frame
    pub fn with_max_frame_size(mut self, limit: usize) -> Self {
        self.reader_limit = limit;
        self
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` fires
    ///
    /// Each connection runs on its own task. After shutdown, in-flight
    /// connections get `grace` to finish and are then aborted.
    pub async fn serve(self, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken, grace: Duration) -> Result<()> {
        info!("Event listener at {}", self.local_addr()?);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Event listener stopping");
                    break;
                }

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let dispatcher = dispatcher.clone();
                            let limit = self.reader_limit;
                            connections.spawn(handle_connection(stream, peer, dispatcher, limit));
                        }
                        Err(e) => warn!("Failed to accept connection: {}", e),
                    }
                }

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!("Aborting {} connections still in flight", connections.len());
            connections.shutdown().await;
        }

        info!("Event listener stopped");
        Ok(())
    }
}

/// Read one frame, acknowledge, close, then decode and dispatch
async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, dispatcher: Arc<Dispatcher>, limit: usize) {
    let mut reader = FrameReader::with_max_frame_size(limit);
    let raw = match reader.read_frame(&mut stream).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("Connection from {} closed without data", peer);
            return;
        }
        Err(e) => {
            warn!("Failed to read frame from {}: {}", peer, e);
            return;
        }
    };

    if let Err(e) = stream.write_all(ACK).await {
        debug!("Failed to acknowledge {}: {}", peer, e);
    }
    let _ = stream.shutdown().await;
    drop(stream);

    match decode(&raw) {
        Ok(envelope) => {
            debug!("Frame from {}: client={} type={:?} trace={:?}", peer, envelope.client_id, envelope.kind, envelope.trace);
            dispatcher.dispatch(envelope).await;
        }
        Err(e) => {
            warn!("Dropping malformed frame from {}: {} ({:?})", peer, e, String::from_utf8_lossy(&raw));
        }
    }
}
