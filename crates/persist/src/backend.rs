//! Storage backend abstraction.
//!
//! The store only needs a key-value surface where a single `put` replaces a
//! value atomically. Device or browser bindings implement [`Backend`]
//! outside this crate.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Errors raised by a backend. The store passes them through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("value for {key} is {size} bytes, backend limit is {limit}")]
    QuotaExceeded {
        key: String,
        size: usize,
        limit: usize,
    },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Transactional key-value storage.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Replace the value under `key`. Readers see either the old or the new
    /// value, never a mix.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BackendError>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), BackendError>;

    /// Keys starting with `prefix` (all keys when `None`), sorted.
    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, BackendError>;

    /// Largest value the backend accepts, if it enforces one.
    fn size_ceiling(&self) -> Option<usize> {
        None
    }
}

/// In-memory backend, optionally with a per-value size ceiling.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    ceiling: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject values larger than `limit` bytes, like quota-bound device storage.
    pub fn with_size_ceiling(limit: usize) -> Self {
        Self {
            entries: RwLock::default(),
            ceiling: Some(limit),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BackendError> {
        if let Some(limit) = self.ceiling {
            if value.len() > limit {
                return Err(BackendError::QuotaExceeded {
                    key: key.to_string(),
                    size: value.len(),
                    limit,
                });
            }
        }
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, BackendError> {
        let entries = self.entries.read().await;
        let prefix = prefix.unwrap_or("");
        Ok(entries
            .range(prefix.to_string()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn size_ceiling(&self) -> Option<usize> {
        self.ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_crud() {
        let backend = MemoryBackend::new();
        assert!(backend.get("a").await.unwrap().is_none());

        backend.put("a", b"one".to_vec()).await.unwrap();
        backend.put("a", b"two".to_vec()).await.unwrap();
        assert_eq!(backend.get("a").await.unwrap().unwrap(), b"two");

        backend.delete("a").await.unwrap();
        backend.delete("a").await.unwrap();
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn memory_backend_lists_by_prefix() {
        let backend = MemoryBackend::new();
        for key in ["world:b", "world:a", "backup:a:1", "meta:store"] {
            backend.put(key, Vec::new()).await.unwrap();
        }
        assert_eq!(
            backend.list_keys(Some("world:")).await.unwrap(),
            ["world:a", "world:b"]
        );
        assert_eq!(backend.list_keys(None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn memory_backend_enforces_ceiling() {
        let backend = MemoryBackend::with_size_ceiling(4);
        backend.put("k", vec![0; 4]).await.unwrap();
        let err = backend.put("k", vec![0; 5]).await.unwrap_err();
        assert!(matches!(err, BackendError::QuotaExceeded { size: 5, limit: 4, .. }));
        assert_eq!(backend.size_ceiling(), Some(4));
    }
}
