//! TOML config file loading
//!
//! Config files are optional. A missing file yields defaults; a file that
//! cannot be read or parsed is reported and also yields defaults, so a typo
//! never keeps the relay or a client from starting.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::{MurmurError, Result};

/// Parse a config file strictly
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| MurmurError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| MurmurError::ConfigInvalid {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Parse a config file, falling back to defaults
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        tracing::debug!("Config file {} not found, using defaults", path.display());
        return T::default();
    }

    match load(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("{}, using defaults", e);
            T::default()
        }
    }
}
