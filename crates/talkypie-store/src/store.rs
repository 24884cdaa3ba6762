//! Persistence for the single profile document.
//!
//! Writes go through [`ProfileStore::put`], which replaces the whole document.
//! [`FileProfileStore`] stages the new encoding in a temporary file beside
//! the target and renames it into place while holding the store's write
//! lock, so a concurrent [`ProfileStore::get`] sees either the previous or
//! the next complete document.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::StoreError;
use crate::profile::{encode_document, ProfileDocument};

/// Default file name, resolved against the process working directory.
pub const DEFAULT_PROFILE_FILE: &str = "profile.json";

/// Get/put access to the persisted profile.
///
/// Implementations are shared across request handlers and sessions, so all
/// operations take `&self` and must serialize writes internally.
pub trait ProfileStore: Send + Sync + fmt::Debug {
    /// Returns the current document, or `Ok(None)` if none has been written.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Corrupt` if the persisted bytes are not a JSON
    /// object, or `StoreError::Io` if they cannot be read.
    fn get(&self) -> Result<Option<ProfileDocument>, StoreError>;

    /// Replaces the persisted document wholesale.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` or `StoreError::Json` if the document cannot
    /// be encoded or durably written.
    fn put(&self, document: &ProfileDocument) -> Result<(), StoreError>;
}

/// Reads the profile, treating every failure as "no profile".
///
/// Personalization is best-effort: a missing, unreadable, or corrupt file
/// must never stop a session from starting.
pub fn load_profile_best_effort(store: &dyn ProfileStore) -> Option<ProfileDocument> {
    match store.get() {
        Ok(document) => document,
        Err(StoreError::Corrupt(reason)) => {
            tracing::warn!(%reason, "profile document is corrupt, continuing without profile");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to read profile, continuing without profile");
            None
        }
    }
}

/// A profile store backed by one JSON file.
pub struct FileProfileStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(|poisoned| {
            // The guarded data is `()`; the file itself is only ever
            // replaced by rename, so a panicked writer cannot leave it torn.
            tracing::error!("profile store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(|poisoned| {
            tracing::error!("profile store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl fmt::Debug for FileProfileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileProfileStore")
            .field("path", &self.path)
            .finish()
    }
}

impl ProfileStore for FileProfileStore {
    fn get(&self) -> Result<Option<ProfileDocument>, StoreError> {
        let contents = {
            let _guard = self.read_guard();
            match std::fs::read_to_string(&self.path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    return Err(StoreError::Corrupt(format!("not valid UTF-8: {e}")))
                }
                Err(e) => return Err(StoreError::Io(e)),
            }
        };

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(document)) => Ok(Some(document)),
            Ok(_) => Err(StoreError::Corrupt("top-level value is not an object".to_string())),
            Err(e) => Err(StoreError::Corrupt(e.to_string())),
        }
    }

    fn put(&self, document: &ProfileDocument) -> Result<(), StoreError> {
        let encoded = encode_document(document)?;

        let _guard = self.write_guard();
        let mut staged = NamedTempFile::new_in(self.staging_dir())?;
        staged.write_all(encoded.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        tracing::debug!(path = %self.path.display(), bytes = encoded.len(), "profile written");
        Ok(())
    }
}

/// An in-memory profile store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    document: RwLock<Option<ProfileDocument>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `document`.
    pub fn with_document(document: ProfileDocument) -> Self {
        Self {
            document: RwLock::new(Some(document)),
        }
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get(&self) -> Result<Option<ProfileDocument>, StoreError> {
        let guard = self
            .document
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(guard.clone())
    }

    fn put(&self, document: &ProfileDocument) -> Result<(), StoreError> {
        let mut guard = self
            .document
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(document.clone());
        Ok(())
    }
}
