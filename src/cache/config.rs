//! Query cache configuration.
//!
//! Controls the backend and expiry windows via `scriptorium.toml`.

use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_NAMESPACE: &str = "EFCache:";
const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_DEPENDENCY_TTL_SECS: u64 = 3600;

/// Store backing the query cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Process-local map; entries vanish on restart.
    Memory,
    /// Shared Redis instance.
    Redis,
}

/// Query cache configuration from `scriptorium.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve and store query results at all.
    pub enabled: bool,
    /// Which store holds entries and dependency sets.
    pub backend: CacheBackend,
    /// Connection URL, required for the redis backend.
    pub redis_url: Option<String>,
    /// Prefix applied to every key the cache writes.
    pub namespace: String,
    /// Expiry (seconds) for entries written without a policy.
    pub default_ttl_secs: u64,
    /// Expiry (seconds) refreshed on a dependency set at every insert.
    pub dependency_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
            redis_url: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_ttl_secs: DEFAULT_TTL_SECS,
            dependency_ttl_secs: DEFAULT_DEPENDENCY_TTL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            redis_url: settings.redis_url.clone(),
            namespace: settings.namespace.clone(),
            default_ttl_secs: settings.default_ttl.as_secs(),
            dependency_ttl_secs: settings.dependency_ttl.as_secs(),
        }
    }
}

impl CacheConfig {
    /// Expiry for entries written without a policy, clamped to one second.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs.max(1))
    }

    /// Window a dependency set survives after its last insert, clamped to one second.
    pub fn dependency_ttl(&self) -> Duration {
        Duration::from_secs(self.dependency_ttl_secs.max(1))
    }

    /// Pattern matching every key written under the namespace.
    pub fn namespace_pattern(&self) -> String {
        format!("{}*", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.backend, CacheBackend::Memory);
        assert!(config.redis_url.is_none());
        assert_eq!(config.namespace, "EFCache:");
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.dependency_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn zero_ttl_clamps_to_one_second() {
        let config = CacheConfig {
            default_ttl_secs: 0,
            dependency_ttl_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.default_ttl(), Duration::from_secs(1));
        assert_eq!(config.dependency_ttl(), Duration::from_secs(1));
    }

    #[test]
    fn namespace_pattern_appends_wildcard() {
        let config = CacheConfig {
            namespace: "blog:".to_string(),
            ..Default::default()
        };
        assert_eq!(config.namespace_pattern(), "blog:*");
    }
}
