//! murmur-utils: Common utilities shared across murmur crates
//!
//! This crate provides:
//! - Unified error types ([`MurmurError`], [`Result`])
//! - Logging infrastructure ([`init_logging_with_config`], [`LogConfig`])
//! - TOML config file loading ([`config::load_or_default`])
//! - XDG-compliant path utilities ([`paths`] module)

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

// Re-export main types at crate root for convenience
pub use error::{MurmurError, Result};
pub use logging::{init_logging_with_config, LogConfig, LogOutput};

pub use paths::{
    client_config_file, config_dir, history_file, log_dir, server_config_file, state_dir,
};
