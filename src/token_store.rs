//! Durable key/value persistence for credential material.
//!
//! [`TokenStore`] is deliberately forgiving: a backend that fails on read is
//! treated as empty, and failed writes are logged and dropped. Losing the
//! persisted credential only means the user logs in again.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Error;
use crate::types::TokenPair;

/// Storage backend that may fail (disabled storage, quota, permissions).
pub trait KeyValueStorage: Send + Sync + 'static {
    fn read(&self, key: &str) -> Result<Option<String>, Error>;
    fn write(&self, key: &str, value: &str) -> Result<(), Error>;
    fn delete(&self, key: &str) -> Result<(), Error>;
}

/// In-process storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entries().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), Error> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Key/value pairs kept in a single JSON object file.
///
/// Writes go to a sibling temp file which is then renamed over the original,
/// so a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, Error> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(Error::Storage(format!("{}: {e}", self.path.display()))),
        }
    }

    /// Current entries as the base for a write, and whether the file must be
    /// rewritten regardless. An undecodable file is replaced rather than
    /// blocking every later write.
    fn load_for_write(&self) -> Result<(HashMap<String, String>, bool), Error> {
        match self.load() {
            Ok(entries) => Ok((entries, false)),
            Err(Error::Decode(e)) => {
                tracing::warn!(
                    error = %e,
                    path = %self.path.display(),
                    "Discarding corrupt storage file"
                );
                Ok((HashMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    fn store(&self, entries: &HashMap<String, String>) -> Result<(), Error> {
        let io_err = |e: std::io::Error| Error::Storage(format!("{}: {e}", self.path.display()));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("tmp");
        let body = serde_json::to_vec_pretty(entries)?;
        {
            let mut file = fs::File::create(&tmp).map_err(io_err)?;
            file.write_all(&body).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp, &self.path).map_err(io_err)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, Error> {
        let _guard = self.guard();
        Ok(self.load()?.remove(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Error> {
        let _guard = self.guard();
        let (mut entries, _) = self.load_for_write()?;
        entries.insert(key.to_owned(), value.to_owned());
        self.store(&entries)
    }

    fn delete(&self, key: &str) -> Result<(), Error> {
        let _guard = self.guard();
        let (mut entries, corrupt) = self.load_for_write()?;
        if entries.remove(key).is_some() || corrupt {
            self.store(&entries)?;
        }
        Ok(())
    }
}

/// Best-effort credential persistence over a [`KeyValueStorage`].
pub struct TokenStore<B> {
    backend: B,
    credential_key: String,
}

impl<B: KeyValueStorage> TokenStore<B> {
    /// Create a store that keeps the credential under `credential_key`.
    #[must_use]
    pub fn new(backend: B, credential_key: impl Into<String>) -> Self {
        Self {
            backend,
            credential_key: credential_key.into(),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Read a value. Backend failures read as `None`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        match self.backend.read(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, key, "Storage read failed, treating as empty");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.backend.write(key, value) {
            tracing::warn!(error = %e, key, "Storage write failed");
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.backend.delete(key) {
            tracing::warn!(error = %e, key, "Storage delete failed");
        }
    }

    /// The persisted token pair, if any. Undecodable blobs count as absent.
    #[must_use]
    pub fn load_credential(&self) -> Option<TokenPair> {
        let raw = self.get(&self.credential_key)?;
        match serde_json::from_str(&raw) {
            Ok(pair) => Some(pair),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed stored credential");
                None
            }
        }
    }

    pub fn save_credential(&self, tokens: &TokenPair) {
        match serde_json::to_string(tokens) {
            Ok(raw) => self.set(&self.credential_key, &raw),
            Err(e) => tracing::warn!(error = %e, "Credential encoding failed"),
        }
    }

    pub fn clear_credential(&self) {
        self.remove(&self.credential_key);
    }
}
