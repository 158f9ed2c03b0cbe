//! murmur-server: TCP broadcast relay
//!
//! Every byte chunk a client sends is tagged with that client's id and
//! forwarded to all other connected clients.

pub mod config;
pub mod registry;
pub mod server;

pub use config::ServerConfig;
pub use registry::{BroadcastOutcome, Connection, ConnectionRegistry, FrameSink};
pub use server::RelayServer;
