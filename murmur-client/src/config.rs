//! Client-side configuration
//!
//! Loaded from `client.toml` in the config directory. Every field has a
//! default, so an empty or missing file is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay address as `host:port`
    pub server_addr: String,
    /// Consecutive failed connection attempts before the client gives up
    pub max_retries: u32,
    /// Pause after a failed connection attempt
    pub retry_interval_ms: u64,
    /// Backoff when a socket would block, and the flag polling period
    pub poll_interval_ms: u64,
    pub history: HistoryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".into(),
            max_retries: 5,
            retry_interval_ms: 2000,
            poll_interval_ms: 100,
            history: HistoryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Chat history file settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// History file (default: `$XDG_STATE_HOME/murmur/message.txt`)
    pub path: Option<PathBuf>,
    /// Bytes buffered in memory before a batch is handed to a writer
    pub buffer_capacity: usize,
    /// Number of background writer threads
    pub writers: usize,
    /// Print the existing history on startup
    pub replay: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            buffer_capacity: 1024,
            writers: 2,
            replay: true,
        }
    }
}

impl HistoryConfig {
    /// Resolved history file path
    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(murmur_utils::history_file)
    }
}
