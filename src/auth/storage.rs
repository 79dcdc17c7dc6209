//! Persistent client-side key-value storage backing the mock session.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::auth::{AuthError, AuthResult};

pub const PRINCIPAL_KEY: &str = "portal.auth.user";
pub const TOKEN_KEY: &str = "portal.auth.token";
pub const PREFERENCES_KEY: &str = "portal.user.preferences";
/// `Cookie` header held for the remote authority between processes.
pub const COOKIE_KEY: &str = "portal.auth.cookies";

/// String-keyed store shared by every component in the process.
///
/// No locking spans multiple calls and no change notification exists: another
/// process writing the same backing file is only observed on the next read.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AuthResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AuthResult<()>;
    fn remove(&self, key: &str) -> AuthResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AuthResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AuthResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// JSON object on disk, re-read on every access and replaced atomically on write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> AuthResult<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|err| {
                AuthError::Storage(format!(
                    "{} is not a valid store file: {}",
                    self.path.display(),
                    err
                ))
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> AuthResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut file = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut file, entries)?;
        file.write_all(b"\n")?;
        file.persist(&self.path)?;
        Ok(())
    }

    fn modify<F>(&self, f: F) -> AuthResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self.write_lock.lock();
        let mut entries = match self.load() {
            Ok(entries) => entries,
            Err(AuthError::Storage(reason)) => {
                log::warn!("store: replacing unreadable contents: {}", reason);
                BTreeMap::new()
            }
            Err(err) => return Err(err),
        };
        f(&mut entries);
        self.save(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> AuthResult<()> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> AuthResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.modify(|entries| {
            entries.remove(key);
        })
    }
}

/// Caller preferences kept beside the session keys. The controller never reads them.
#[derive(Clone)]
pub struct PreferencesStore {
    store: Arc<dyn KeyValueStore>,
}

impl PreferencesStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Stored preferences, or an empty object when absent or unreadable.
    pub fn load(&self) -> Value {
        match self.store.get(PREFERENCES_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                log::warn!("discarding unreadable preferences: {}", err);
                Value::Object(Default::default())
            }),
            Ok(None) => Value::Object(Default::default()),
            Err(err) => {
                log::warn!("failed to read preferences: {}", err);
                Value::Object(Default::default())
            }
        }
    }

    pub fn save(&self, preferences: &Value) -> AuthResult<()> {
        let raw = serde_json::to_string(preferences)?;
        self.store.set(PREFERENCES_KEY, &raw)
    }

    pub fn clear(&self) -> AuthResult<()> {
        self.store.remove(PREFERENCES_KEY)
    }
}
