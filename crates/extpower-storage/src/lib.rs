//! Persistent settings storage for extpower
//!
//! Settings are small named values addressed by slash-separated key paths,
//! e.g. `ext_power/state/EXT_POWER`. Values are opaque bytes; callers own
//! the encoding.
//!
//! # Stores
//!
//! - [`FileStore`]: one file per key under a root directory, survives reboots
//! - [`MemoryStore`]: process-local, counts writes and can inject failures

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid settings key: {0}")]
    InvalidKey(String),

    #[error("Settings storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key-value store for persisted settings
pub trait SettingsStore: Send + Sync {
    /// Save `value` under `key`, replacing any previous value
    fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Load the value stored under `key`, `None` if nothing was ever saved
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Check that a key is a relative path of non-empty, non-special segments
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }

    let valid = key
        .split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if !valid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }

    Ok(())
}
