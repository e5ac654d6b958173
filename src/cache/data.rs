//! Cached query payloads and expiration policies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rows materialized from a reader so they can be replayed on a cache hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRows {
    pub table_name: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl TableRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A cached query result.
///
/// `is_null` marks a query that produced nothing, so a hit can be told apart
/// from a miss.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedData {
    #[serde(default)]
    pub is_null: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_rows: Option<TableRows>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalar: Option<serde_json::Value>,
    #[serde(default)]
    pub non_query: i64,
}

impl CachedData {
    /// Marker stored when the query returned nothing.
    pub fn null() -> Self {
        Self {
            is_null: true,
            ..Self::default()
        }
    }

    pub fn rows(rows: TableRows) -> Self {
        Self {
            table_rows: Some(rows),
            ..Self::default()
        }
    }

    pub fn scalar(value: serde_json::Value) -> Self {
        Self {
            scalar: Some(value),
            ..Self::default()
        }
    }

    pub fn non_query(affected: i64) -> Self {
        Self {
            non_query: affected,
            ..Self::default()
        }
    }
}

/// How a policy-driven entry expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationMode {
    /// Expires at a fixed offset from the write.
    Absolute,
    /// Every read restarts the countdown.
    Sliding,
}

/// Expiration requested by the interception layer for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub mode: ExpirationMode,
    pub timeout: Duration,
}

impl CachePolicy {
    pub fn absolute(timeout: Duration) -> Self {
        Self {
            mode: ExpirationMode::Absolute,
            timeout,
        }
    }

    pub fn sliding(timeout: Duration) -> Self {
        Self {
            mode: ExpirationMode::Sliding,
            timeout,
        }
    }

    pub fn expiry(&self) -> Expiry {
        match self.mode {
            ExpirationMode::Absolute => Expiry::Absolute(self.timeout),
            ExpirationMode::Sliding => Expiry::Sliding(self.timeout),
        }
    }
}

/// Expiration handed to a key-value store on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Absolute(Duration),
    Sliding(Duration),
}

impl Expiry {
    pub fn duration(&self) -> Duration {
        match self {
            Self::Absolute(ttl) | Self::Sliding(ttl) => *ttl,
        }
    }

    pub fn is_sliding(&self) -> bool {
        matches!(self, Self::Sliding(_))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn null_marker_sets_flag_only() {
        let data = CachedData::null();
        assert!(data.is_null);
        assert!(data.table_rows.is_none());
        assert!(data.scalar.is_none());
        assert_eq!(data.non_query, 0);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let data: CachedData = serde_json::from_value(json!({ "scalar": 7 })).expect("decode");
        assert!(!data.is_null);
        assert_eq!(data.scalar, Some(json!(7)));
        assert!(data.table_rows.is_none());
    }

    #[test]
    fn policy_maps_to_store_expiry() {
        let ttl = Duration::from_secs(60);
        assert_eq!(CachePolicy::absolute(ttl).expiry(), Expiry::Absolute(ttl));
        assert_eq!(CachePolicy::sliding(ttl).expiry(), Expiry::Sliding(ttl));
        assert!(CachePolicy::sliding(ttl).expiry().is_sliding());
        assert_eq!(Expiry::Sliding(ttl).duration(), ttl);
    }
}
