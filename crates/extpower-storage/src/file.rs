//! File-backed settings store

use crate::{SettingsStore, StorageError, validate_key};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Distinguishes temp files of overlapping writes
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Settings stored as one file per key under a root directory
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// power cut mid-write leaves either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(root)?;

        if !root.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        tracing::info!("Settings store opened at {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, s| path.join(s)))
    }
}

impl SettingsStore for FileStore {
    fn save(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let tmp = path.with_file_name(tmp_name);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(value)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        tracing::debug!("Saved {} ({} bytes)", key, value.len());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;

        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
