//! In-memory settings store

use crate::{SettingsStore, StorageError, validate_key};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    values: HashMap<String, Vec<u8>>,
    writes: Vec<(String, Vec<u8>)>,
    fail_loads: bool,
    fail_saves: bool,
}

/// Process-local store, mainly for tests
///
/// Keeps a log of every successful write so tests can assert on how many
/// times the backing storage was touched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a value without recording a write
    pub fn with_value(self, key: &str, value: &[u8]) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.values.insert(key.to_string(), value.to_vec());
        }
        self
    }

    /// Current value under `key`
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.values.get(key).cloned())
    }

    /// Successful writes, oldest first
    pub fn writes(&self) -> Vec<(String, Vec<u8>)> {
        self.state
            .read()
            .map(|s| s.writes.clone())
            .unwrap_or_default()
    }

    pub fn write_count(&self) -> usize {
        self.state.read().map(|s| s.writes.len()).unwrap_or(0)
    }

    /// Simulate an unreadable backing store
    pub fn set_fail_loads(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_loads = fail;
        }
    }

    /// Simulate an unwritable backing store
    pub fn set_fail_saves(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_saves = fail;
        }
    }
}

impl SettingsStore for MemoryStore {
    fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut state = self
            .state
            .write()
            .map_err(|_| StorageError::Unavailable("memory store poisoned".into()))?;

        if state.fail_saves {
            return Err(StorageError::Unavailable("write rejected".into()));
        }

        state.values.insert(key.to_string(), value.to_vec());
        state.writes.push((key.to_string(), value.to_vec()));
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::Unavailable("memory store poisoned".into()))?;

        if state.fail_loads {
            return Err(StorageError::Unavailable("read rejected".into()));
        }

        Ok(state.values.get(key).cloned())
    }
}
