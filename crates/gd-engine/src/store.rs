//! Persisted key/value configuration
//!
//! The engine persists a handful of JSON values under fixed keys. Any host
//! storage that can get and set JSON by key works; a whole-file JSON store
//! and an in-memory store are provided.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

/// Storage keys.
pub mod keys {
    pub const IS_ENABLED: &str = "isAdBlockerEnabled";
    pub const TOTAL_BLOCKED: &str = "totalBlockedCount";
    pub const WHITELIST: &str = "whitelistedSites";
    pub const USER_RULES: &str = "userRules";
    pub const NEXT_USER_RULE_ID: &str = "nextUserRuleId";
    pub const ENABLED_LISTS: &str = "enabledFilterLists";
    pub const COSMETIC_RULES: &str = "cosmeticRules";
    pub const USER_COSMETIC_RULES: &str = "userCosmeticRules";
}

/// Error type for storage access.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Stored value for '{key}' is malformed: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Storage file is not a JSON object: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("Failed to encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Read and decode `key`, falling back to `default` when absent.
pub async fn load_or<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
    default: T,
) -> Result<T, StoreError> {
    match store.get(key).await? {
        Some(Value::Null) | None => Ok(default),
        Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Decode {
            key: key.to_string(),
            source,
        }),
    }
}

pub async fn save<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value).await
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, Value>>,
    reject_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `set` fail until switched back.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.lock().await.clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::other(format!("write of '{key}' rejected")),
            });
        }
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

// =============================================================================
// JSON file store
// =============================================================================

/// All keys in one JSON object on disk. Writes go through a temp file and
/// a rename so a crash never leaves a half-written file behind.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(StoreError::Corrupt),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn write_all(&self, values: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let bytes = serde_json::to_vec_pretty(values).map_err(|source| StoreError::Encode {
            key: "*".to_string(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_all().await?;
        values.insert(key.to_string(), value);
        self.write_all(&values).await
    }
}
