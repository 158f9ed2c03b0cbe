//! Relay server configuration
//!
//! Loaded from `server.toml` in the config directory; command-line flags
//! override individual fields.

use serde::Deserialize;

use murmur_protocol::MAX_PAYLOAD_SIZE;

/// Default listen address (all interfaces, fixed port)
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the relay listens on
    pub listen_addr: String,
    /// Upper bound on bytes taken from a client in one read
    pub max_payload: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.into(),
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }
}
