use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// The persistent medium behind a [`Storage`](super::Storage) context.
///
/// Several contexts may share one backend, the way browser tabs share one
/// per-origin store. Writes are last-writer-wins; implementations need no
/// versioning.
pub trait StorageBackend: Send + Sync {
    /// Get the raw string stored under `key`. Returns None if there is no entry.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous entry.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete the entry for `key`. Missing keys are ignored.
    fn remove(&self, key: &str);

    /// All keys currently present, in no particular order.
    fn keys(&self) -> Vec<String>;
}

/// In-memory backend with an optional byte quota.
///
/// The quota counts the UTF-8 length of every key plus its value.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryBackend {
    /// Create an unbounded backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that rejects writes once `bytes` would be exceeded.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota: Some(bytes),
        }
    }

    /// Bytes currently used by all entries.
    pub fn used_bytes(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(limit) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > limit {
                return Err(Error::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().cloned().collect()
    }
}
