//! In-process store with Redis-like semantics.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use glob::{MatchOptions, Pattern};
use tokio::time::Instant;

use super::super::data::Expiry;
use super::super::lock::{rw_read, rw_write};
use super::{KeyValueStore, StoreError};

const SOURCE: &str = "cache::store::memory";

// Keys are flat strings: `*` crosses `/` and `.` like Redis MATCH.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

enum Slot {
    Value(Bytes),
    Set(BTreeSet<String>),
}

struct Entry {
    slot: Slot,
    deadline: Option<Instant>,
    sliding: Option<Duration>,
}

// A TTL past the clock's range never expires.
fn deadline_after(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(ttl)
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.deadline.is_none_or(|deadline| deadline > now)
    }
}

/// Store keeping every key in a map behind one lock.
///
/// Expired keys are treated as absent on read and dropped on the next write
/// that touches them.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys that have not expired.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "len")
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired key and report how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "purge_expired");
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "set_add");
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Set(BTreeSet::new()),
            deadline: None,
            sliding: None,
        });
        match &mut entry.slot {
            Slot::Set(members) => {
                members.insert(member.to_string());
                Ok(())
            }
            Slot::Value(_) => Err(StoreError::wrong_type(key, "set_add")),
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "set_members");
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.slot {
                Slot::Set(members) => Ok(members.iter().cloned().collect()),
                Slot::Value(_) => Err(StoreError::wrong_type(key, "set_members")),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "expire");
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.deadline = deadline_after(now, ttl);
                entry.sliding = None;
                Ok(true)
            }
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "ttl");
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.deadline)
            .map(|deadline| deadline - now))
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        if !entry.is_live(now) {
            entries.remove(key);
            return Ok(None);
        }

        match &entry.slot {
            Slot::Value(value) => {
                let value = value.clone();
                if let Some(window) = entry.sliding {
                    entry.deadline = deadline_after(now, window);
                }
                Ok(Some(value))
            }
            Slot::Set(_) => Err(StoreError::wrong_type(key, "get")),
        }
    }

    async fn set(&self, key: &str, value: Bytes, expiry: Expiry) -> Result<(), StoreError> {
        let now = Instant::now();
        let entry = Entry {
            slot: Slot::Value(value),
            deadline: deadline_after(now, expiry.duration()),
            sliding: expiry.is_sliding().then(|| expiry.duration()),
        };
        rw_write(&self.entries, SOURCE, "set").insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let removed = rw_write(&self.entries, SOURCE, "delete").remove(key);
        Ok(removed.is_some_and(|entry| entry.is_live(now)))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        let pattern = Pattern::new(pattern)?;
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "delete_pattern");
        let mut removed = 0u64;
        entries.retain(|key, entry| {
            if pattern.matches_with(key, MATCH_OPTIONS) {
                if entry.is_live(now) {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(removed)
    }
}
