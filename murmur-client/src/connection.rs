//! Connection handle and the flags shared by the session's activities
//!
//! The socket lives in an [`ArcSwapOption`]: the supervisor is the only
//! activity that stores into it, while send and receive load whatever is
//! current for each operation. A handle replaced under their feet simply
//! fails its next operation, which they treat like any other disconnect.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::debug;

/// Opens new connections to the relay
pub trait Dialer: Send + Sync {
    fn dial(&self) -> io::Result<TcpStream>;
}

/// Dials a fixed `host:port`
#[derive(Debug, Clone)]
pub struct TcpDialer {
    addr: String,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Dialer for TcpDialer {
    fn dial(&self) -> io::Result<TcpStream> {
        TcpStream::connect(&self.addr)
    }
}

/// Observable connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Terminated,
}

/// State shared by send, receive and supervisor
#[derive(Debug, Default)]
pub struct SessionState {
    connected: AtomicBool,
    exit_requested: AtomicBool,
    retry_count: AtomicU32,
    stream: ArcSwapOption<TcpStream>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        if self.exit_requested() {
            ConnectionState::Terminated
        } else if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::SeqCst)
    }

    /// Consecutive failed connection attempts since the last success
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    /// Ask every activity to stop; takes precedence over reconnecting
    pub fn request_exit(&self) {
        self.exit_requested.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Current socket, if one is installed
    pub fn current_stream(&self) -> Option<Arc<TcpStream>> {
        self.stream.load_full()
    }

    /// Report that `stream` failed
    ///
    /// Ignored when the supervisor has already replaced it, so a late error
    /// on a stale socket cannot knock down a fresh connection.
    pub fn mark_lost(&self, stream: &Arc<TcpStream>) {
        if let Some(current) = self.stream.load_full() {
            if Arc::ptr_eq(&current, stream) {
                self.connected.store(false, Ordering::SeqCst);
            }
        }
    }

    pub(crate) fn record_failed_attempt(&self) -> u32 {
        self.retry_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Swap in a fresh socket and mark the session connected
    ///
    /// Returns `false` and leaves the session disconnected when exit was
    /// requested, including while the stream was being dialed.
    pub(crate) fn install(&self, stream: TcpStream) -> bool {
        if self.exit_requested() {
            return false;
        }

        self.stream.store(Some(Arc::new(stream)));
        self.retry_count.store(0, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);

        // request_exit may have cleared `connected` just before the store above
        if self.exit_requested() {
            self.connected.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Remove and shut down the current socket
    pub(crate) fn tear_down(&self) {
        if let Some(old) = self.stream.swap(None) {
            // wakes any activity still blocked on the old handle
            if let Err(e) = old.shutdown(Shutdown::Both) {
                debug!("Shutdown of stale socket failed: {}", e);
            }
        }
    }
}
