//! Durable, debounced persistence of in-progress drafts.
//!
//! A draft is the locally mutated, uncommitted copy of a record plus
//! transient form-only fields. The store coalesces keystroke-level `persist`
//! calls so each quiet interval produces at most one durable write, and
//! restores an interrupted draft at session start. Storage failures are
//! reported but never block the in-memory edit.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::warn;
use serde_json::{Map, Value};
use tokio::time::{Duration, sleep};

use crate::core::{Record, Result, SyncError};

/// Working copy of a record under edit. `fields` is what diffs and submits
/// see; `transient` holds form-only state that must never leak upstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub fields: Map<String, Value>,
    pub transient: Map<String, Value>,
}

impl Draft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record(record: &Record) -> Self {
        Self {
            fields: record.fields.clone(),
            transient: Map::new(),
        }
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn set_transient(&mut self, key: impl Into<String>, value: Value) {
        self.transient.insert(key.into(), value);
    }
}

/// Key-value store persisting across reloads within one client
/// (localStorage-shaped).
pub trait DurableStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Ephemeral storage for tests and headless use.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// One file per key under a directory, written atomically via a temp file
/// and rename so a crash mid-write never corrupts a stored draft.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl DurableStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.persist(self.path_for(key))
            .map_err(|err| SyncError::Storage(err.error.to_string()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DraftStoreConfig {
    /// Quiet interval before a pending draft is written durably.
    pub debounce: Duration,

    /// Key prefix separating draft slots from other storage users.
    pub namespace: String,
}

impl DraftStoreConfig {
    pub fn new() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            namespace: "ordersync.draft".to_string(),
        }
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(SyncError::Config("namespace cannot be empty".to_string()));
        }
        if self.debounce.is_zero() {
            return Err(SyncError::Config("debounce must be > 0".to_string()));
        }
        Ok(())
    }
}

impl Default for DraftStoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct PendingWrite {
    generation: u64,
    payload: Value,
}

/// Debounced draft persistence over a [`DurableStorage`].
///
/// Storage is scoped per logical draft slot (one "new record in progress"
/// slot exists at a time by construction), not per record id.
pub struct DraftStore {
    storage: Arc<dyn DurableStorage>,
    config: DraftStoreConfig,
    pending: Arc<Mutex<HashMap<String, PendingWrite>>>,
}

impl DraftStore {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self::with_config(storage, DraftStoreConfig::default())
    }

    pub fn with_config(storage: Arc<dyn DurableStorage>, config: DraftStoreConfig) -> Self {
        Self {
            storage,
            config,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedules a durable write of `payload` for `slot`. Calls within one
    /// quiet interval coalesce: only the last payload reaches storage.
    ///
    /// Must run inside a tokio runtime (the flush is a spawned timer task).
    pub fn persist(&self, slot: &str, payload: Value) {
        let generation = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            let entry = pending.entry(slot.to_string()).or_insert(PendingWrite {
                generation: 0,
                payload: Value::Null,
            });
            entry.generation += 1;
            entry.payload = payload;
            entry.generation
        };

        let storage = Arc::clone(&self.storage);
        let pending = Arc::clone(&self.pending);
        let key = self.key_for(slot);
        let slot = slot.to_string();
        let debounce = self.config.debounce;
        tokio::spawn(async move {
            sleep(debounce).await;
            let payload = {
                let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
                match pending.get(&slot) {
                    // A newer persist superseded this timer.
                    Some(entry) if entry.generation != generation => return,
                    Some(_) => pending.remove(&slot).map(|entry| entry.payload),
                    None => return,
                }
            };
            if let Some(payload) = payload {
                write_payload(storage.as_ref(), &key, &payload);
            }
        });
    }

    /// Writes any pending payload for `slot` immediately, bypassing the
    /// quiet interval.
    pub fn flush_now(&self, slot: &str) {
        let payload = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(slot).map(|entry| entry.payload)
        };
        if let Some(payload) = payload {
            write_payload(self.storage.as_ref(), &self.key_for(slot), &payload);
        }
    }

    /// Restores the stored payload for `slot`, if any. Called once at
    /// session start so an interrupted edit can resume. A corrupt payload
    /// counts as absent: resuming is best effort.
    pub fn restore(&self, slot: &str) -> Result<Option<Value>> {
        let Some(raw) = self.storage.get(&self.key_for(slot))? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(payload) => Ok(Some(payload)),
            Err(err) => {
                warn!("discarding corrupt draft in slot '{slot}': {err}");
                Ok(None)
            }
        }
    }

    /// Drops the slot: cancels any pending write and removes the stored
    /// payload. Called on submit success or explicit discard.
    pub fn clear(&self, slot: &str) -> Result<()> {
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(slot);
        }
        self.storage.remove(&self.key_for(slot))
    }

    fn key_for(&self, slot: &str) -> String {
        format!("{}.{}", self.config.namespace, slot)
    }
}

/// Failures here are logged, never propagated: a broken storage must not
/// block the in-memory edit.
fn write_payload(storage: &dyn DurableStorage, key: &str, payload: &Value) {
    let serialized = match serde_json::to_string(payload) {
        Ok(serialized) => serialized,
        Err(err) => {
            warn!("draft payload for '{key}' is not serializable: {err}");
            return;
        }
    };
    if let Err(err) = storage.set(key, &serialized) {
        warn!("draft write for '{key}' failed: {err}");
    }
}
