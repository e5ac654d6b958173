//! Read-through wrapper used by data access code.
//!
//! Cache failures never fail a query: a broken store degrades to running the
//! query against the source of truth.

use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use super::data::{CachePolicy, CachedData};
use super::keys::CacheKey;
use super::provider::{CacheError, InvalidationOutcome, QueryCacheProvider};

const METRIC_FALLTHROUGH: &str = "scriptorium_query_cache_fallthrough_total";

#[derive(Clone)]
pub struct QueryCacheInterceptor {
    provider: Arc<QueryCacheProvider>,
}

impl QueryCacheInterceptor {
    pub fn new(provider: Arc<QueryCacheProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<QueryCacheProvider> {
        &self.provider
    }

    /// Serve `key` from the cache, or run `fetch` and cache what it returns.
    ///
    /// A cached null marker comes back as `Ok(None)` without running `fetch`.
    pub async fn read_through<F, Fut, E>(
        &self,
        key: &CacheKey,
        policy: Option<&CachePolicy>,
        fetch: F,
    ) -> Result<Option<CachedData>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<CachedData>, E>>,
    {
        if !self.provider.config().enabled {
            return fetch().await;
        }

        match self.provider.get(key).await {
            Ok(Some(cached)) => return Ok((!cached.is_null).then_some(cached)),
            Ok(None) => {}
            Err(err @ CacheError::InvalidArgument(_)) => {
                warn!(error = %err, "query cache bypassed for unusable key");
                return fetch().await;
            }
            Err(err) => {
                counter!(METRIC_FALLTHROUGH).increment(1);
                warn!(
                    key_hash = %key.key_hash,
                    error = %err,
                    "query cache read failed; running query"
                );
            }
        }

        let fresh = fetch().await?;

        if let Err(err) = self.provider.insert(key, fresh.clone(), policy).await {
            warn!(
                key_hash = %key.key_hash,
                error = %err,
                "query cache write failed; result not cached"
            );
        }

        Ok(fresh)
    }

    /// Invalidate cached reads after a command modified the roots of `key`.
    ///
    /// An early-expired dependency set means the cache can no longer tell
    /// which entries are stale, so everything is cleared.
    pub async fn on_write(&self, key: &CacheKey) -> Option<InvalidationOutcome> {
        if !self.provider.config().enabled {
            return None;
        }

        let outcome = match self.provider.invalidate_dependencies(key).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    key_hash = %key.key_hash,
                    error = %err,
                    "query cache invalidation failed"
                );
                return None;
            }
        };

        if let Some(root) = outcome.expired_root.as_deref() {
            match self.provider.clear_all().await {
                Ok(removed) => info!(
                    root_cache_key = root,
                    removed, "cleared query cache after early dependency expiry"
                ),
                Err(err) => warn!(
                    root_cache_key = root,
                    error = %err,
                    "query cache clear failed"
                ),
            }
        }

        Some(outcome)
    }
}
