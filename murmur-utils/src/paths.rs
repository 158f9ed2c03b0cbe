//! Path utilities for murmur
//!
//! Handles XDG Base Directory specification compliance for config and
//! state directories.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const APP_NAME: &str = "murmur";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory
///
/// Location: `$XDG_CONFIG_HOME/murmur` or `~/.config/murmur`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(fallback_config_dir)
}

/// Server configuration file (`server.toml`)
pub fn server_config_file() -> PathBuf {
    config_dir().join("server.toml")
}

/// Client configuration file (`client.toml`)
pub fn client_config_file() -> PathBuf {
    config_dir().join("client.toml")
}

/// Get the state directory
///
/// Location: `$XDG_STATE_HOME/murmur` or `~/.local/state/murmur`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(fallback_state_dir)
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/murmur/log`
pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

/// Default chat history file
///
/// Location: `$XDG_STATE_HOME/murmur/message.txt`
pub fn history_file() -> PathBuf {
    state_dir().join("message.txt")
}

// Fallbacks when ProjectDirs is unavailable

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn fallback_config_dir() -> PathBuf {
    home_dir().join(".config").join(APP_NAME)
}

fn fallback_state_dir() -> PathBuf {
    home_dir().join(".local").join("state").join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_contains_app_name() {
        assert!(config_dir().to_string_lossy().contains("murmur"));
    }

    #[test]
    fn test_config_files_are_toml_in_config_dir() {
        let dir = config_dir();
        for file in [server_config_file(), client_config_file()] {
            assert!(file.starts_with(&dir));
            assert_eq!(file.extension().unwrap(), "toml");
        }
        assert_ne!(server_config_file(), client_config_file());
    }

    #[test]
    fn test_log_dir_in_state_dir() {
        assert!(log_dir().starts_with(state_dir()));
        assert!(log_dir().ends_with("log"));
    }

    #[test]
    fn test_history_file_name() {
        let path = history_file();
        assert!(path.starts_with(state_dir()));
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "message.txt");
    }

    #[test]
    fn test_fallbacks_use_app_name() {
        assert!(fallback_config_dir().ends_with("murmur"));
        assert!(fallback_state_dir().ends_with("state/murmur"));
    }
}
