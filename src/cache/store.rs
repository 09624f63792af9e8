//! Backend abstraction for the feature cache

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::CacheResult;

/// A key/value store with per-entry expiry.
///
/// Implementations report every failure as an error; deciding what a
/// failure means for a request is left to [`super::FeatureCache`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name for logs and health output
    fn backend_name(&self) -> &'static str;

    /// Raw payload stored under `key`, `None` when absent or expired
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, expiring after `ttl` when given
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove `key`; `true` when something was removed
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Round trip to the store
    async fn ping(&self) -> CacheResult<()>;

    /// Release connections. Later calls fail with `NotConnected`.
    async fn disconnect(&self);
}
