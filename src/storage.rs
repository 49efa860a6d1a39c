use anyhow::{Context, Result};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::StorageError;

/// Minimal key-value persistence used by every store.
///
/// Methods take `&self` so one backend can be shared by several stores
/// through an `Arc`.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// A change to a key made outside this process.
/// `new_value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
}

// Keys double as file stems, so they are kept to a safe alphabet.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn check_key(key: &str) -> Result<(), StorageError> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

// ---- In-memory backend ----

/// HashMap-backed storage with an optional byte quota over all values.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("memory storage read lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        check_key(key)?;
        let entries = self.entries.read().expect("memory storage read lock");
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        check_key(key)?;
        let mut entries = self.entries.write().expect("memory storage write lock");

        if let Some(quota) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            let needed = others + value.len();
            if needed > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        self.entries
            .write()
            .expect("memory storage write lock")
            .remove(key);
        Ok(())
    }
}

// ---- File backend ----

/// One `<key>.json` file per key inside a data directory.
pub struct FileStorage {
    dir: PathBuf,
    quota_bytes: Option<usize>,
    // Last value this process wrote or saw per key. Shared with watchers so
    // our own writes are not reported back as external changes.
    known: Arc<Mutex<HashMap<String, Option<String>>>>,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            quota_bytes: None,
            known: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn with_quota(mut self, quota_bytes: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        check_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }

    fn used_bytes_excluding(&self, key: &str) -> Result<usize, StorageError> {
        let mut total = 0usize;
        for entry in std::fs::read_dir(&self.dir)?.flatten() {
            let path = entry.path();
            if key_from_path(&path).map_or(true, |k| k == key) {
                continue;
            }
            total += entry.metadata()?.len() as usize;
        }
        Ok(total)
    }

    fn remember(&self, key: &str, value: Option<String>) {
        let mut known = self.known.lock().expect("known values mutex");
        known.insert(key.to_string(), value);
    }

    /// Start watching the data directory for changes made by other processes.
    pub fn watch(&self) -> Result<StorageWatcher, StorageError> {
        let (tx, rx) = unbounded_channel();
        let known = Arc::clone(&self.known);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => forward_event(&event, &known, &tx),
                Err(e) => tracing::warn!(error = %e, "storage watcher error"),
            },
            Config::default(),
        )?;
        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;

        tracing::debug!(dir = %self.dir.display(), "watching storage directory");
        Ok(StorageWatcher {
            _watcher: watcher,
            events: rx,
        })
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        let value = match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        self.remember(key, value.clone());
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        if let Some(quota) = self.quota_bytes {
            let needed = self.used_bytes_excluding(key)? + value.len();
            if needed > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }

        // Remember before the rename lands so the watcher sees a known value.
        self.remember(key, Some(value.to_string()));
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        self.remember(key, None);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn key_from_path(path: &Path) -> Option<&str> {
    if path.extension().map_or(true, |ext| ext != "json") {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|k| is_valid_key(k))
}

fn forward_event(
    event: &notify::Event,
    known: &Mutex<HashMap<String, Option<String>>>,
    tx: &UnboundedSender<StorageEvent>,
) {
    match event.kind {
        notify::EventKind::Create(_)
        | notify::EventKind::Modify(_)
        | notify::EventKind::Remove(_) => {}
        _ => return,
    }

    for path in &event.paths {
        let Some(key) = key_from_path(path) else {
            continue;
        };

        let current = match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "could not read changed storage file");
                continue;
            }
        };

        {
            let mut known = known.lock().expect("known values mutex");
            if known.get(key) == Some(&current) {
                continue;
            }
            known.insert(key.to_string(), current.clone());
        }

        tracing::debug!(key, removed = current.is_none(), "external storage change");
        let _ = tx.send(StorageEvent {
            key: key.to_string(),
            new_value: current,
        });
    }
}

/// Receives external changes to a [`FileStorage`] directory.
/// Dropping it stops the underlying watcher.
pub struct StorageWatcher {
    _watcher: RecommendedWatcher,
    events: UnboundedReceiver<StorageEvent>,
}

impl StorageWatcher {
    pub async fn next(&mut self) -> Option<StorageEvent> {
        self.events.recv().await
    }

    pub fn try_next(&mut self) -> Option<StorageEvent> {
        self.events.try_recv().ok()
    }
}

// ---- JSON helpers ----

/// Read and decode a JSON value. `Ok(None)` when the key is absent.
pub fn read_json<T, S>(storage: &S, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    S: Storage + ?Sized,
{
    let Some(raw) = storage
        .get(key)
        .with_context(|| format!("reading '{}'", key))?
    else {
        return Ok(None);
    };
    let value = serde_json::from_str(&raw).with_context(|| format!("parsing '{}'", key))?;
    Ok(Some(value))
}

/// Encode and write a JSON value. Failures are logged, not returned: the
/// caller's in-memory state stays authoritative either way.
pub fn write_json<T, S>(storage: &S, key: &str, value: &T) -> bool
where
    T: Serialize + ?Sized,
    S: Storage + ?Sized,
{
    let encoded = match serde_json::to_string(value) {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::error!(key, error = %e, "failed to encode value for storage");
            return false;
        }
    };
    match storage.set(key, &encoded) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(key, error = %e, "failed to persist value");
            false
        }
    }
}

/// Remove a key, logging failures.
pub fn remove_key<S>(storage: &S, key: &str) -> bool
where
    S: Storage + ?Sized,
{
    match storage.remove(key) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(key, error = %e, "failed to remove persisted value");
            false
        }
    }
}
