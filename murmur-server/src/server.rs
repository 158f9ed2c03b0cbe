//! Event multiplexer and broadcast router
//!
//! One task owns the listener, the [`ConnectionRegistry`] and the read side
//! of every client. Reads from all clients are merged into a single stream,
//! so each loop iteration waits on exactly one thing: whichever of "a client
//! is knocking" or "some client sent bytes" becomes ready first.

use std::net::SocketAddr;

use bytes::Bytes;
use futures::stream::{self, BoxStream, SelectAll};
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

use murmur_protocol::{ChunkCodec, CodecError, Frame, SenderId};
use murmur_utils::{MurmurError, Result};

use crate::config::ServerConfig;
use crate::registry::ConnectionRegistry;

/// Something that happened on a client's read side
#[derive(Debug)]
enum Inbound {
    /// One bounded read worth of bytes, or the error that ended the stream
    Data(SenderId, std::result::Result<Bytes, CodecError>),
    /// The peer closed its side
    Closed(SenderId),
}

/// The relay: accepts clients and forwards each message to all others
pub struct RelayServer {
    listener: TcpListener,
    registry: ConnectionRegistry,
    inbound: SelectAll<BoxStream<'static, Inbound>>,
    codec: ChunkCodec,
}

impl RelayServer {
    /// Bind the listening socket
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .map_err(|e| MurmurError::Bind {
                addr: config.listen_addr.clone(),
                source: e,
            })?;

        info!("Relay listening on {}", config.listen_addr);

        let codec = ChunkCodec::with_max_chunk(config.max_payload);
        if codec.max_chunk() != config.max_payload {
            warn!(
                "max_payload {} out of range, using {}",
                config.max_payload,
                codec.max_chunk()
            );
        }

        Ok(Self {
            listener,
            registry: ConnectionRegistry::new(),
            inbound: SelectAll::new(),
            codec,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.on_accept(stream, peer),
                        Err(e) => error!("Accept failed: {}", e),
                    }
                }
                Some(event) = self.inbound.next(), if !self.inbound.is_empty() => {
                    self.on_inbound(event);
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping relay");
                    break;
                }
            }
        }

        info!("Relay stopped with {} clients connected", self.registry.len());
        Ok(())
    }

    fn on_accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        let (reader, writer) = stream.into_split();
        let id = self.registry.add(peer, writer);

        let reads = FramedRead::new(reader, self.codec)
            .map(move |chunk| Inbound::Data(id, chunk))
            .chain(stream::once(async move { Inbound::Closed(id) }));
        self.inbound.push(reads.boxed());

        info!("New client connected: {} (id {})", peer, id);
    }

    fn on_inbound(&mut self, event: Inbound) {
        match event {
            Inbound::Data(id, Ok(payload)) => self.route(id, payload),
            Inbound::Data(id, Err(e)) => {
                warn!("Read from client {} failed: {}", id, e);
                self.disconnect(id);
            }
            Inbound::Closed(id) => self.disconnect(id),
        }
    }

    fn route(&mut self, origin: SenderId, payload: Bytes) {
        debug!(
            "Received message from client {}: {}",
            origin,
            String::from_utf8_lossy(&payload)
        );

        let wire = match Frame::new(origin, payload).encode() {
            Ok(wire) => wire,
            Err(e) => {
                warn!("Dropping message from client {}: {}", origin, e);
                return;
            }
        };

        let outcome = self.registry.broadcast_except(origin, &wire);
        debug!(
            "Broadcast from {}: {} delivered, {} failed",
            origin, outcome.delivered, outcome.failed
        );
    }

    fn disconnect(&mut self, id: SenderId) {
        if let Some(conn) = self.registry.remove(id) {
            info!("Client disconnected: {} (id {})", conn.peer(), id);
        }
    }
}
