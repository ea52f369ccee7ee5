//! In-process L2 store
//!
//! Behaves like a shared key-value server (expiring keys, glob `keys`, `info`)
//! without the network hop. Handy as a development backend and in tests,
//! where [`MemoryStore::set_failing`] simulates an outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ahash::RandomState;
use async_trait::async_trait;
use parking_lot::Mutex;

use super::{glob_match, ttl_secs, L2Store};
use crate::error::{StoreError, StoreResult};

struct StoredValue {
    data: Vec<u8>,
    expires_at: Instant,
}

/// Shared in-memory key-value store with per-key expiry
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue, RandomState>>,
    failing: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`StoreError::Unavailable`]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Number of `get` calls served
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of `set_with_ttl` calls served
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of unexpired keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|stored| stored.expires_at > now)
            .count()
    }

    /// Check if no unexpired keys are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::Relaxed) {
            Err(StoreError::Unavailable("memory store is failing".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl L2Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(stored) if stored.expires_at > now => Ok(Some(stored.data.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, ttl: Duration, value: Vec<u8>) -> StoreResult<()> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        let expires_at = Instant::now() + Duration::from_secs(ttl_secs(ttl));
        self.entries.lock().insert(
            key.to_string(),
            StoredValue {
                data: value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.check_available()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn flush_all(&self) -> StoreResult<()> {
        self.check_available()?;
        self.entries.lock().clear();
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.check_available()?;

        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(key, stored)| stored.expires_at > now && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn info(&self) -> StoreResult<HashMap<String, String>> {
        self.check_available()?;

        let now = Instant::now();
        let entries = self.entries.lock();
        let live = entries.values().filter(|stored| stored.expires_at > now);
        let (count, bytes) = live.fold((0usize, 0usize), |(count, bytes), stored| {
            (count + 1, bytes + stored.data.len())
        });

        let mut info = HashMap::new();
        info.insert("backend".to_string(), "memory".to_string());
        info.insert("keys".to_string(), count.to_string());
        info.insert("used_memory".to_string(), bytes.to_string());
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();

        store.set_with_ttl("book_1", Duration::from_secs(60), b"one".to_vec()).await.unwrap();
        store.set_with_ttl("book_2", Duration::from_secs(60), b"two".to_vec()).await.unwrap();
        store.set_with_ttl("user_1", Duration::from_secs(60), b"u".to_vec()).await.unwrap();

        assert_eq!(store.get("book_1").await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.keys("book_*").await.unwrap(), vec!["book_1", "book_2"]);
        assert_eq!(store.len(), 3);
        assert_eq!(store.reads(), 2);
        assert_eq!(store.writes(), 3);

        let info = store.info().await.unwrap();
        assert_eq!(info.get("keys").map(String::as_str), Some("3"));
        assert_eq!(info.get("used_memory").map(String::as_str), Some("7"));

        store.delete("book_1").await.unwrap();
        assert_eq!(store.get("book_1").await.unwrap(), None);

        store.flush_all().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_failing() {
        let store = MemoryStore::new();
        store.set_failing(true);

        assert!(matches!(store.get("k").await, Err(StoreError::Unavailable(_))));
        assert!(store
            .set_with_ttl("k", Duration::from_secs(1), vec![1])
            .await
            .is_err());
        assert!(store.info().await.is_err());

        store.set_failing(false);
        assert!(store.get("k").await.unwrap().is_none());
    }
}
