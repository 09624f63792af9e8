//! Degrade-to-absent cache client used by the request pipeline

use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::memory::MemoryStore;
use super::redis_store::RedisStore;
use super::store::CacheStore;
use crate::config::{CacheBackend, CacheConfig};
use crate::errors::{AppError, AppResult, CacheError, CacheResult};

/// Typed JSON client over a [`CacheStore`].
///
/// Only [`FeatureCache::connect`] reports failure. Every other operation
/// swallows store errors after logging them: reads come back absent and
/// writes report `false`, so an outage turns into cache misses instead of
/// failed requests. A store that stops answering is cut off after
/// `operation_timeout` and treated the same way.
#[derive(Clone)]
pub struct FeatureCache {
    store: Arc<dyn CacheStore>,
    connected: Arc<AtomicBool>,
    operation_timeout: Duration,
}

impl FeatureCache {
    /// Connect the configured backend. Failure here is fatal to startup.
    pub async fn connect(config: &CacheConfig) -> AppResult<Self> {
        let store: Arc<dyn CacheStore> = match config.backend {
            CacheBackend::Redis => Arc::new(
                RedisStore::connect(config)
                    .await
                    .map_err(|e| AppError::cache_unavailable(e.to_string()))?,
            ),
            CacheBackend::Memory => Arc::new(MemoryStore::new(config.memory_capacity)),
        };

        info!("Feature cache ready (backend: {})", store.backend_name());
        Ok(Self::from_store(store).with_operation_timeout(config.operation_timeout))
    }

    /// Wrap an already connected store
    pub fn from_store(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            connected: Arc::new(AtomicBool::new(true)),
            operation_timeout: CacheConfig::default().operation_timeout,
        }
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = CacheResult<T>>,
    ) -> CacheResult<T> {
        tokio::time::timeout(self.operation_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(CacheError::Timeout {
                    operation,
                    timeout: self.operation_timeout,
                })
            })
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Decode the value under `key`. Absent on a miss, on any store error,
    /// and on a payload that does not decode; a malformed payload is also
    /// removed so the next request recomputes it.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.is_connected() {
            warn!("Cache get for {} while disconnected", key);
            return None;
        }

        let raw = match self.bounded("get", self.store.get(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("Cache miss: {}", key);
                return None;
            }
            Err(e) => {
                warn!("Cache get failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => {
                debug!("Cache hit: {}", key);
                Some(value)
            }
            Err(e) => {
                warn!("Discarding malformed cache entry {}: {}", key, e);
                self.delete(key).await;
                None
            }
        }
    }

    /// Encode and store `value`; `false` on any failure
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        if !self.is_connected() {
            warn!("Cache set for {} while disconnected", key);
            return false;
        }

        let payload = match serde_json::to_vec(value).map_err(CacheError::from) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Cache set failed for {}: {}", key, e);
                return false;
            }
        };

        match self.bounded("set", self.store.set(key, &payload, ttl)).await {
            Ok(()) => {
                debug!("Cache set: {} (ttl: {:?})", key, ttl);
                true
            }
            Err(e) => {
                warn!("Cache set failed for {}: {}", key, e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.bounded("delete", self.store.delete(key)).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Cache delete failed for {}: {}", key, e);
                false
            }
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.bounded("exists", self.store.exists(key)).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Cache exists failed for {}: {}", key, e);
                false
            }
        }
    }

    /// Liveness probe used by the health endpoint
    pub async fn ping(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.bounded("ping", self.store.ping()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Cache ping failed: {}", e);
                false
            }
        }
    }

    /// Close the store. Safe to call more than once.
    pub async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.store.disconnect().await;
            info!("Feature cache disconnected");
        }
    }
}

impl std::fmt::Debug for FeatureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureCache")
            .field("backend", &self.backend_name())
            .field("connected", &self.is_connected())
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}
