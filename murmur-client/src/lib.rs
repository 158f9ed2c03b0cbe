//! murmur-client: interactive chat client
//!
//! A session runs three activities side by side: one sends typed lines to
//! the relay, one prints what other users said, and a supervisor redials
//! when the connection drops. Both directions are also appended to a local
//! history file.

pub mod config;
pub mod connection;
pub mod handler;
pub mod history;
pub mod input;
pub mod session;

pub use config::{ClientConfig, HistoryConfig};
pub use connection::{ConnectionState, Dialer, SessionState, TcpDialer};
pub use handler::{format_incoming, CallbackHandler, MessageHandler, SessionEvent, StdoutHandler};
pub use history::{replay, HistoryWriter};
pub use input::spawn_line_reader;
pub use session::{ChatSession, SessionHandle, EXIT_COMMAND};
