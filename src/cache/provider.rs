//! Second-level query cache provider.
//!
//! Stores query results under their key hash and keeps, per root cache key,
//! a set of the hashes that read it. Invalidating a root fans out over that
//! set instead of scanning every cached entry.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, instrument};

use super::config::CacheConfig;
use super::data::{CachePolicy, CachedData, Expiry};
use super::keys::CacheKey;
use super::store::{KeyValueStore, StoreError};

const METRIC_HIT: &str = "scriptorium_query_cache_hit_total";
const METRIC_MISS: &str = "scriptorium_query_cache_miss_total";
const METRIC_INSERT: &str = "scriptorium_query_cache_insert_total";
const METRIC_INVALIDATE: &str = "scriptorium_query_cache_invalidate_total";

const DEPENDENCY_SEGMENT: &str = "dep:";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid argument `{0}`: a cache key with a non-blank hash is required")]
    InvalidArgument(&'static str),
    #[error("cache store failure: {0}")]
    Store(#[from] StoreError),
    #[error("cached data could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
}

/// What one `invalidate_dependencies` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationOutcome {
    /// Root cache keys whose dependency sets were deleted, in processing order.
    pub dropped_roots: Vec<String>,
    /// Cached entries removed through the dependency sets.
    pub invalidated_entries: u64,
    /// Root whose dependency set had already expired while the entry was
    /// still cached. Remaining roots of the key were not processed.
    pub expired_root: Option<String>,
}

impl InvalidationOutcome {
    /// True when the caller should treat the whole cache as stale.
    pub fn requires_full_invalidation(&self) -> bool {
        self.expired_root.is_some()
    }
}

/// Dependency-aware query result cache over a key-value store.
pub struct QueryCacheProvider {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
}

impl QueryCacheProvider {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Store key holding the cached data for a key hash.
    pub fn entry_key(&self, key_hash: &str) -> String {
        format!("{}{key_hash}", self.config.namespace)
    }

    /// Store key holding the dependency set of a root cache key.
    pub fn dependency_key(&self, root: &str) -> String {
        format!("{}{DEPENDENCY_SEGMENT}{root}", self.config.namespace)
    }

    /// Cache a query result.
    ///
    /// `None` is stored as the null marker so a later hit reports a cached
    /// absence. Without a policy the entry expires after the default TTL.
    #[instrument(skip_all, fields(key_hash = %key.key_hash))]
    pub async fn insert(
        &self,
        key: &CacheKey,
        value: Option<CachedData>,
        policy: Option<&CachePolicy>,
    ) -> Result<(), CacheError> {
        ensure_key(key)?;

        let value = value.unwrap_or_else(CachedData::null);
        let payload = Bytes::from(serde_json::to_vec(&value)?);

        for root in key.root_keys() {
            let dependency_key = self.dependency_key(root);
            self.store.set_add(&dependency_key, &key.key_hash).await?;
            self.store
                .expire(&dependency_key, self.config.dependency_ttl())
                .await?;
        }

        let expiry = policy
            .map(CachePolicy::expiry)
            .unwrap_or(Expiry::Absolute(self.config.default_ttl()));
        self.store
            .set(&self.entry_key(&key.key_hash), payload, expiry)
            .await?;

        counter!(METRIC_INSERT).increment(1);
        Ok(())
    }

    /// Look up a cached result. `Ok(None)` means not cached or expired.
    #[instrument(skip_all, fields(key_hash = %key.key_hash))]
    pub async fn get(&self, key: &CacheKey) -> Result<Option<CachedData>, CacheError> {
        ensure_key(key)?;

        let cached = match self.store.get(&self.entry_key(&key.key_hash)).await? {
            Some(bytes) => Some(serde_json::from_slice::<CachedData>(&bytes)?),
            None => None,
        };

        if cached.is_some() {
            counter!(METRIC_HIT).increment(1);
            debug!(cache = "query", outcome = "hit");
        } else {
            counter!(METRIC_MISS).increment(1);
            debug!(cache = "query", outcome = "miss");
        }
        Ok(cached)
    }

    /// Invalidate every entry that depends on the root cache keys of `key`.
    ///
    /// Each root's dependency set is deleted together with the entries it
    /// lists. Dropping only the set would leave those entries readable until
    /// their own expiry.
    ///
    /// When a root's dependency set is already gone while `key` still has a
    /// cached value, the set expired early: the set is dropped, the root is
    /// reported in `expired_root`, and the remaining roots are left untouched.
    #[instrument(skip_all, fields(key_hash = %key.key_hash))]
    pub async fn invalidate_dependencies(
        &self,
        key: &CacheKey,
    ) -> Result<InvalidationOutcome, CacheError> {
        ensure_key(key)?;

        let entry_key = self.entry_key(&key.key_hash);
        let mut outcome = InvalidationOutcome::default();

        for root in key.root_keys() {
            let dependency_key = self.dependency_key(root);
            let cached = self.store.get(&entry_key).await?;
            let members = self.store.set_members(&dependency_key).await?;

            if members.is_empty() && cached.is_some() {
                debug!(
                    root_cache_key = root,
                    "Invalidated all of the cache entries due to early expiration of a root cache key"
                );
                self.store.delete(&dependency_key).await?;
                outcome.dropped_roots.push(root.to_string());
                outcome.expired_root = Some(root.to_string());
                break;
            }

            for member in &members {
                if self.store.delete(&self.entry_key(member)).await? {
                    outcome.invalidated_entries += 1;
                }
            }
            self.store.delete(&dependency_key).await?;
            outcome.dropped_roots.push(root.to_string());
        }

        counter!(METRIC_INVALIDATE).increment(outcome.invalidated_entries);
        debug!(
            roots = outcome.dropped_roots.len(),
            entries = outcome.invalidated_entries,
            early_expiry = outcome.expired_root.is_some(),
            "dependencies invalidated"
        );
        Ok(outcome)
    }

    /// Remove everything this cache wrote under its namespace.
    #[instrument(skip_all, fields(namespace = %self.config.namespace))]
    pub async fn clear_all(&self) -> Result<u64, CacheError> {
        let removed = self
            .store
            .delete_pattern(&self.config.namespace_pattern())
            .await?;
        debug!(removed, "cleared all cached entries");
        Ok(removed)
    }
}

fn ensure_key(key: &CacheKey) -> Result<(), CacheError> {
    if key.is_blank() {
        return Err(CacheError::InvalidArgument("cache_key"));
    }
    Ok(())
}
