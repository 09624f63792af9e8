//! Feature cache
//!
//! Maps content-derived keys to feature summaries in a TTL-bounded store.
//! Redis is the production backend; an in-process LRU stands in for local
//! runs and tests.

pub mod entry;
pub mod memory;
pub mod redis_store;
pub mod service;
pub mod store;

pub use entry::{CacheEntry, KEY_PREFIX, cache_key};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use service::FeatureCache;
pub use store::CacheStore;
