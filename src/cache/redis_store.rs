//! Redis-backed cache store

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::store::CacheStore;
use crate::config::CacheConfig;
use crate::errors::{CacheError, CacheResult};

/// Cache store over a multiplexed, auto-reconnecting Redis connection
pub struct RedisStore {
    manager: RwLock<Option<ConnectionManager>>,
    endpoint: String,
}

impl RedisStore {
    /// Open a connection and verify it with a PING, bounded by
    /// `connect_timeout`.
    pub async fn connect(config: &CacheConfig) -> CacheResult<Self> {
        let endpoint = format!("{}:{}/{}", config.host, config.port, config.db);
        let client = redis::Client::open(config.redis_url())?;

        let manager = tokio::time::timeout(config.connect_timeout, client.get_connection_manager())
            .await
            .map_err(|_| CacheError::Connection {
                message: format!(
                    "timed out after {:?} connecting to {}",
                    config.connect_timeout, endpoint
                ),
            })?
            .map_err(|e| CacheError::Connection {
                message: format!("{endpoint}: {e}"),
            })?;

        let store = Self {
            manager: RwLock::new(Some(manager)),
            endpoint,
        };

        tokio::time::timeout(config.connect_timeout, store.ping())
            .await
            .map_err(|_| CacheError::Connection {
                message: format!("PING to {} timed out", store.endpoint),
            })??;

        info!("Connected to Redis at {}", store.endpoint);
        Ok(store)
    }

    async fn connection(&self) -> CacheResult<ConnectionManager> {
        // ConnectionManager is a cheap handle onto the shared connection
        self.manager
            .read()
            .await
            .clone()
            .ok_or(CacheError::NotConnected)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        match ttl {
            // Redis expiry has whole-second resolution
            Some(ttl) => {
                let seconds = ttl.as_secs().max(1);
                let _: () = conn.set_ex(key, value, seconds).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn disconnect(&self) {
        if self.manager.write().await.take().is_some() {
            debug!("Dropped Redis connection to {}", self.endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_to_unreachable_host_fails() {
        let config = CacheConfig {
            host: "127.0.0.1".to_string(),
            // Reserved port, nothing listens here
            port: 1,
            connect_timeout: Duration::from_millis(500),
            ..CacheConfig::default()
        };

        let result = RedisStore::connect(&config).await;
        assert!(matches!(result, Err(CacheError::Connection { .. })));
    }
}
