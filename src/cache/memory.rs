//! In-process cache store for single-node and local runs

use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::store::CacheStore;
use crate::errors::{CacheError, CacheResult};

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Bounded LRU store with per-entry expiry. Expired entries are dropped
/// lazily on access.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, MemoryEntry>>,
    connected: AtomicBool,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            connected: AtomicBool::new(true),
        }
    }

    /// Number of entries currently held, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn ensure_connected(&self) -> CacheResult<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CacheError::NotConnected)
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.ensure_connected()?;
        let mut entries = self.entries.lock().await;

        let expired = match entries.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => true,
            Some(entry) => return Ok(Some(entry.value.clone())),
            None => return Ok(None),
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.ensure_connected()?;
        let entry = MemoryEntry {
            value: value.to_vec(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.lock().await.put(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.ensure_connected()?;
        let removed = self.entries.lock().await.pop(key);
        Ok(removed.is_some_and(|entry| !entry.is_expired(Instant::now())))
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.ensure_connected()?;
        let entries = self.entries.lock().await;
        Ok(entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now())))
    }

    async fn ping(&self) -> CacheResult<()> {
        self.ensure_connected()
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.entries.lock().await.clear();
    }
}
