//! Redis-backed store.
//!
//! Sliding entries keep their window (milliseconds) in a companion key so a
//! hit can push both keys' expiry forward.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use tracing::debug;

use super::super::data::Expiry;
use super::{KeyValueStore, StoreError};

const SLIDING_SUFFIX: &str = ":sliding";
const SCAN_BATCH: usize = 100;

pub struct RedisStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("conn", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisStore {
    /// Open a managed, auto-reconnecting connection to `url`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn sliding_key(key: &str) -> String {
        format!("{key}{SLIDING_SUFFIX}")
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: u64 = redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let applied: bool = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(applied)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        let remaining: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        // -2: no such key, -1: key without expiry
        Ok(u64::try_from(remaining).ok().map(Duration::from_millis))
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut conn = self.conn.clone();
        let sliding_key = Self::sliding_key(key);
        let (value, window): (Option<Vec<u8>>, Option<u64>) = redis::pipe()
            .cmd("GET")
            .arg(key)
            .cmd("GET")
            .arg(&sliding_key)
            .query_async(&mut conn)
            .await?;

        if let (Some(_), Some(window)) = (&value, window) {
            let _: () = redis::pipe()
                .cmd("PEXPIRE")
                .arg(key)
                .arg(window)
                .ignore()
                .cmd("PEXPIRE")
                .arg(&sliding_key)
                .arg(window)
                .ignore()
                .query_async(&mut conn)
                .await?;
            debug!(key, window_ms = window, "refreshed sliding expiry");
        }

        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, expiry: Expiry) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let ttl_ms = millis(expiry.duration());
        let sliding_key = Self::sliding_key(key);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("PX")
            .arg(ttl_ms)
            .ignore();
        if expiry.is_sliding() {
            pipe.cmd("SET")
                .arg(&sliding_key)
                .arg(ttl_ms)
                .arg("PX")
                .arg(ttl_ms)
                .ignore();
        } else {
            pipe.cmd("DEL").arg(&sliding_key).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let (removed, _): (u64, u64) = redis::pipe()
            .cmd("DEL")
            .arg(key)
            .cmd("DEL")
            .arg(Self::sliding_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let mut cursor = 0u64;
        let mut removed = 0u64;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            let logical = keys
                .iter()
                .filter(|key| !key.ends_with(SLIDING_SUFFIX))
                .count() as u64;
            if !keys.is_empty() {
                let _: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                removed += logical;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    //! Live tests; run with `SCRIPTORIUM_TEST_REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored`.

    use super::*;

    async fn connect() -> Option<RedisStore> {
        let url = std::env::var("SCRIPTORIUM_TEST_REDIS_URL").ok()?;
        Some(RedisStore::connect(&url).await.expect("connect to test redis"))
    }

    fn unique(prefix: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        format!("scriptorium-test:{prefix}:{nanos}")
    }

    #[tokio::test]
    #[ignore]
    async fn live_set_get_and_delete() {
        let Some(store) = connect().await else {
            return;
        };
        let key = unique("value");
        store
            .set(
                &key,
                Bytes::from_static(b"payload"),
                Expiry::Absolute(Duration::from_secs(30)),
            )
            .await
            .expect("set");
        assert_eq!(
            store.get(&key).await.expect("get"),
            Some(Bytes::from_static(b"payload"))
        );
        let ttl = store.ttl(&key).await.expect("ttl").expect("has ttl");
        assert!(ttl <= Duration::from_secs(30));
        assert!(store.delete(&key).await.expect("del"));
        assert!(store.get(&key).await.expect("get").is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn live_sets_and_pattern_delete() {
        let Some(store) = connect().await else {
            return;
        };
        let prefix = unique("ns");
        let set_key = format!("{prefix}:Table:Post");
        store.set_add(&set_key, "q1").await.expect("sadd");
        store.set_add(&set_key, "q2").await.expect("sadd");
        assert!(store.expire(&set_key, Duration::from_secs(3600)).await.expect("expire"));

        let mut members = store.set_members(&set_key).await.expect("members");
        members.sort();
        assert_eq!(members, vec!["q1".to_string(), "q2".to_string()]);

        store
            .set(
                &format!("{prefix}:q1"),
                Bytes::from_static(b"v"),
                Expiry::Sliding(Duration::from_secs(30)),
            )
            .await
            .expect("set");

        let removed = store
            .delete_pattern(&format!("{prefix}:*"))
            .await
            .expect("pattern delete");
        assert_eq!(removed, 2);
        assert!(store.set_members(&set_key).await.expect("members").is_empty());
    }
}
