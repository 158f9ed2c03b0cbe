//! Connection Registry
//!
//! Tracks live client connections by their server-assigned id and fans
//! frames out to everyone except the sender. The registry is owned by the
//! server loop and only ever touched from that one task, so it needs no
//! interior locking.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use tokio::net::tcp::OwnedWriteHalf;
use tracing::{debug, trace, warn};

use murmur_protocol::SenderId;

/// Non-blocking write side of a connection
pub trait FrameSink {
    /// Write without blocking, returning how many bytes were accepted
    fn try_send(&self, buf: &[u8]) -> io::Result<usize>;
}

impl FrameSink for OwnedWriteHalf {
    fn try_send(&self, buf: &[u8]) -> io::Result<usize> {
        self.try_write(buf)
    }
}

/// A registered client connection
pub struct Connection<W> {
    id: SenderId,
    peer: SocketAddr,
    sink: W,
    live: bool,
}

impl<W> Connection<W> {
    pub fn id(&self) -> SenderId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// False once a write to this peer failed hard
    pub fn is_live(&self) -> bool {
        self.live
    }
}

impl<W> std::fmt::Debug for Connection<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("live", &self.live)
            .finish()
    }
}

/// Result of one broadcast pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Targets that accepted the whole frame
    pub delivered: usize,
    /// Targets that would block or failed
    pub failed: usize,
}

/// Registry of live connections
pub struct ConnectionRegistry<W = OwnedWriteHalf> {
    connections: HashMap<SenderId, Connection<W>>,
    next_id: u32,
}

impl<W> Default for ConnectionRegistry<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> ConnectionRegistry<W> {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
        }
    }

    /// Register a new connection and assign its id
    pub fn add(&mut self, peer: SocketAddr, sink: W) -> SenderId {
        let id = self.allocate_id();
        self.connections.insert(
            id,
            Connection {
                id,
                peer,
                sink,
                live: true,
            },
        );
        debug!("Registered connection {} from {}", id, peer);
        id
    }

    /// Remove a connection, dropping its write side
    pub fn remove(&mut self, id: SenderId) -> Option<Connection<W>> {
        let removed = self.connections.remove(&id);
        if removed.is_some() {
            debug!("Unregistered connection {}", id);
        }
        removed
    }

    pub fn get(&self, id: SenderId) -> Option<&Connection<W>> {
        self.connections.get(&id)
    }

    pub fn contains(&self, id: SenderId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    // Ids are never reused while the previous holder is still registered.
    fn allocate_id(&mut self) -> SenderId {
        loop {
            let id = SenderId::new(self.next_id);
            self.next_id = self.next_id.wrapping_add(1).max(1);
            if !self.connections.contains_key(&id) {
                return id;
            }
        }
    }
}

impl<W: FrameSink> ConnectionRegistry<W> {
    /// Send `frame` to every live connection except `origin`
    ///
    /// Each target is visited exactly once. A failing target is logged and
    /// skipped; it never stops delivery to the rest.
    pub fn broadcast_except(&mut self, origin: SenderId, frame: &[u8]) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();

        for conn in self.connections.values_mut() {
            if conn.id == origin || !conn.live {
                continue;
            }

            match write_frame(&conn.sink, frame) {
                Ok(()) => {
                    trace!("Delivered {} bytes to {}", frame.len(), conn.id);
                    outcome.delivered += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    warn!("Send buffer of client {} full, frame dropped", conn.id);
                    outcome.failed += 1;
                }
                Err(e) => {
                    warn!("Failed to send to client {}: {}", conn.id, e);
                    conn.live = false;
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }
}

fn write_frame<W: FrameSink>(sink: &W, frame: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < frame.len() {
        match sink.try_send(&frame[written..]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
