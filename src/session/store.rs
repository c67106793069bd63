//! Token Store
//!
//! Durable key-value storage for the two session tokens. Only the
//! session manager writes through it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

/// Storage key of the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key of the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read token file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to write token file {path}: {message}")]
    Write { path: String, message: String },

    #[error("Corrupt token file {path}: {message}")]
    Corrupt { path: String, message: String },
}

/// Key-value storage backend for session tokens
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(&[(key, value)])
    }

    /// Write several keys as one change; either all land or none do
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store; tokens are lost on exit
#[derive(Default)]
pub struct MemoryTokenStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut values = self.values.write();
        for (key, value) in entries {
            values.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.write().remove(key);
        Ok(())
    }
}

// ============================================================================
// File store
// ============================================================================

/// JSON object on disk, cached in memory and written through on change.
///
/// The cache is updated only after the file has been replaced, so memory
/// never holds tokens the disk does not.
pub struct FileTokenStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl FileTokenStore {
    /// Open the store, loading existing tokens if the file exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let values = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                path: path.display().to_string(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(StoreError::Read {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        tracing::debug!(path = %path.display(), keys = values.len(), "Opened token store");

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<(), StoreError> {
        let write_err = |e: &dyn std::fmt::Display| StoreError::Write {
            path: self.path.display().to_string(),
            message: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| write_err(&e))?;
            }
        }

        let json = serde_json::to_string_pretty(values).map_err(|e| write_err(&e))?;

        // Write to a sibling temp file, then rename over the target
        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, json.as_bytes()).map_err(|e| write_err(&e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| write_err(&e))?;

        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut values = self.values.write();
        let mut next = values.clone();
        for (key, value) in entries {
            next.insert(key.to_string(), value.to_string());
        }
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.write();
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}

#[cfg(unix)]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, content)
}
