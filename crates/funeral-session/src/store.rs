//! Durable storage for the current credential.
//!
//! The store holds exactly two keys, `token` and `user`. They are written
//! and cleared together; a document holding only one of them is treated as
//! corrupt and wiped on load.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::StoreError;
use crate::identity::Identity;

/// The persisted pair of bearer token and decoded identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Raw bearer string.
    pub token: String,

    /// Identity decoded when the token was issued.
    pub user: Identity,
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredential")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

/// On-disk shape; both keys are optional so half-written documents can be
/// detected instead of failing to parse.
#[derive(Deserialize)]
struct RawDocument {
    token: Option<String>,
    user: Option<Identity>,
}

/// Key/value persistence that survives process restarts.
pub trait CredentialStore: Send + Sync + fmt::Debug {
    /// Loads the stored credential, if a complete one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or is corrupt.
    fn load(&self) -> Result<Option<StoredCredential>, StoreError>;

    /// Replaces the stored credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential cannot be written.
    fn save(&self, credential: &StoredCredential) -> Result<(), StoreError>;

    /// Removes the stored credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be cleared.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Store backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store writing to `path`. Parent directories are created on
    /// first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn write_atomically(&self, contents: &[u8]) -> Result<(), StoreError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| Self::io_error(parent, e))?;

        // Created owner-only (0600 on unix) under a unique name.
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| Self::io_error(parent, e))?;
        tmp.write_all(contents)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| Self::io_error(tmp.path(), e))?;

        tmp.persist(&self.path)
            .map_err(|e| Self::io_error(&self.path, e.error))?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredCredential>, StoreError> {
        let contents = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(&self.path, e)),
        };

        let raw: RawDocument = serde_json::from_slice(&contents)?;
        match (raw.token, raw.user) {
            (Some(token), Some(user)) => Ok(Some(StoredCredential { token, user })),
            (None, None) => Ok(None),
            _ => {
                tracing::warn!(path = %self.path.display(), "Incomplete credential document, clearing");
                self.clear()?;
                Ok(None)
            }
        }
    }

    fn save(&self, credential: &StoredCredential) -> Result<(), StoreError> {
        let contents = serde_json::to_vec_pretty(credential)?;
        self.write_atomically(&contents)?;
        tracing::debug!(path = %self.path.display(), "Saved credential");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&self.path, e)),
        }
    }
}

/// Process-local store, used for ephemeral sessions and tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entry: Mutex<Option<StoredCredential>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `credential`.
    #[must_use]
    pub fn with_credential(credential: StoredCredential) -> Self {
        Self {
            entry: Mutex::new(Some(credential)),
        }
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entry.lock().is_none()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredCredential>, StoreError> {
        Ok(self.entry.lock().clone())
    }

    fn save(&self, credential: &StoredCredential) -> Result<(), StoreError> {
        *self.entry.lock() = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.entry.lock() = None;
        Ok(())
    }
}
