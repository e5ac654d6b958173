//! Scriptorium Query Cache
//!
//! Second-level cache for database query results:
//!
//! - **Entries** live under `<namespace><key hash>` with a default or
//!   policy-driven (absolute / sliding) expiry.
//! - **Dependency sets** live under `<namespace>dep:<root>` and list the key
//!   hashes that read a root (table). They expire an hour after the last insert.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `scriptorium.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "redis"
//! redis_url = "redis://127.0.0.1/"
//! namespace = "EFCache:"
//! default_ttl_seconds = 300
//! dependency_ttl_seconds = 3600
//! ```

mod config;
mod data;
mod interceptor;
mod keys;
mod lock;
mod provider;
mod store;

pub use config::{CacheBackend, CacheConfig};
pub use data::{CachePolicy, CachedData, ExpirationMode, Expiry, TableRows};
pub use interceptor::QueryCacheInterceptor;
pub use keys::{CacheKey, QueryParam, hash_query};
pub use provider::{CacheError, InvalidationOutcome, QueryCacheProvider};
pub use store::{KeyValueStore, MemoryStore, RedisStore, StoreError, build_store};
