//! Key-value store backends for the query cache.
//!
//! The provider only needs a handful of primitives: string values with an
//! expiry, sets of members, per-key TTLs, and exact or pattern deletes. Each
//! primitive is atomic on its own; sequences of them are not.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use super::config::{CacheBackend, CacheConfig};
use super::data::Expiry;

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key `{key}` holds the wrong kind of value for `{op}`")]
    WrongType { key: String, op: &'static str },
    #[error("redis command failed: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("invalid key pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("store configuration error: {message}")]
    Configuration { message: String },
}

impl StoreError {
    pub fn wrong_type(key: &str, op: &'static str) -> Self {
        Self::WrongType {
            key: key.to_string(),
            op,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Remote (or in-process) key-value store consumed by the query cache.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Add `member` to the set stored at `key`, creating the set when missing.
    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Members of the set at `key`; an absent key yields an empty list.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Set a time-to-live on an existing key. Returns false when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remaining time-to-live. `None` for absent keys and keys without expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Read a value. Sliding entries restart their countdown on every hit.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Write a value, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: Bytes, expiry: Expiry) -> Result<(), StoreError>;

    /// Delete one key. Returns whether something was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete every key matching a glob pattern (`*`, `?`, `[...]`). Returns the number removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError>;
}

/// Build the store selected by the cache configuration.
pub async fn build_store(config: &CacheConfig) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        CacheBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                StoreError::configuration("redis backend selected without a redis url")
            })?;
            let store = RedisStore::connect(url).await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_is_built_without_network() {
        let config = CacheConfig::default();
        let store = build_store(&config).await.expect("memory store");
        store
            .set("k", Bytes::from_static(b"v"), Expiry::Absolute(Duration::from_secs(5)))
            .await
            .expect("set");
        assert_eq!(store.get("k").await.expect("get"), Some(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn redis_backend_requires_url() {
        let config = CacheConfig {
            backend: CacheBackend::Redis,
            redis_url: None,
            ..Default::default()
        };
        let err = build_store(&config).await.err().expect("missing url must fail");
        assert!(matches!(err, StoreError::Configuration { .. }));
    }
}
