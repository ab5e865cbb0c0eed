use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::data::FormData;

/// Durable storage for full form snapshots. Every save replaces the previous snapshot.
pub trait LocalStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<FormData>, StorageError>;
    fn save(&self, key: &str, snapshot: &FormData) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("local storage unavailable for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stored snapshot for {key} is not valid form data: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// In-process store keeping the serialized snapshot per key.
#[derive(Debug, Default, Clone)]
pub struct MemoryLocalStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryLocalStore {
    /// Serialized snapshot as last written, for inspection.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("local store mutex poisoned")
            .get(key)
            .cloned()
    }
}

impl LocalStore for MemoryLocalStore {
    fn load(&self, key: &str) -> Result<Option<FormData>, StorageError> {
        let guard = self.entries.lock().expect("local store mutex poisoned");
        guard
            .get(key)
            .map(|raw| {
                serde_json::from_str(raw).map_err(|source| StorageError::Serialization {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    fn save(&self, key: &str, snapshot: &FormData) -> Result<(), StorageError> {
        let raw = serde_json::to_string(snapshot).map_err(|source| {
            StorageError::Serialization {
                key: key.to_string(),
                source,
            }
        })?;
        self.entries
            .lock()
            .expect("local store mutex poisoned")
            .insert(key.to_string(), raw);
        Ok(())
    }
}

/// One JSON file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileLocalStore {
    root: PathBuf,
}

impl FileLocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn io_error(key: &str, source: std::io::Error) -> StorageError {
        StorageError::Io {
            key: key.to_string(),
            source,
        }
    }
}

impl LocalStore for FileLocalStore {
    fn load(&self, key: &str) -> Result<Option<FormData>, StorageError> {
        let raw = match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Self::io_error(key, err)),
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Serialization {
                key: key.to_string(),
                source,
            })
    }

    fn save(&self, key: &str, snapshot: &FormData) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|err| Self::io_error(key, err))?;

        let raw = serde_json::to_vec_pretty(snapshot).map_err(|source| {
            StorageError::Serialization {
                key: key.to_string(),
                source,
            }
        })?;

        // Write-then-rename keeps the previous snapshot intact if the write fails midway.
        let target = self.path_for(key);
        let staging = self.root.join(format!("{key}.json.tmp"));
        fs::write(&staging, raw).map_err(|err| Self::io_error(key, err))?;
        fs::rename(&staging, &target).map_err(|err| Self::io_error(key, err))
    }
}
