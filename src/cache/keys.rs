//! Cache key definitions.
//!
//! A `CacheKey` pairs the content hash of an intercepted query with the set of
//! root cache keys (usually table names) whose changes must invalidate it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifies one query result in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Content hash of the command text plus its parameters.
    pub key_hash: String,
    /// Root cache keys this result depends on.
    pub dependencies: BTreeSet<String>,
}

/// A named command parameter fed into the key hash.
#[derive(Debug, Clone, Copy)]
pub struct QueryParam<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl<'a> QueryParam<'a> {
    pub fn new(name: &'a str, value: &'a str) -> Self {
        Self { name, value }
    }
}

impl CacheKey {
    /// Create a key from an already computed hash.
    pub fn new<I, S>(key_hash: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key_hash: key_hash.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
        }
    }

    /// Derive the key hash from a command and its parameters.
    ///
    /// Equal command text and parameters always produce the same hash.
    pub fn for_query<I, S>(command: &str, params: &[QueryParam<'_>], dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(hash_query(command, params), dependencies)
    }

    /// True when the key carries no usable hash.
    ///
    /// Such a key stands for an absent key and every provider operation rejects it.
    pub fn is_blank(&self) -> bool {
        self.key_hash.trim().is_empty()
    }

    /// Iterate the dependency identifiers that are not blank.
    pub fn root_keys(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .map(String::as_str)
            .filter(|root| !root.trim().is_empty())
    }
}

/// Hash a command with its parameters into a hex SHA-256 digest.
///
/// Every component is length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
pub fn hash_query(command: &str, params: &[QueryParam<'_>]) -> String {
    let mut hasher = Sha256::new();
    feed(&mut hasher, command);
    for param in params {
        feed(&mut hasher, param.name);
        feed(&mut hasher, param.value);
    }
    hex::encode(hasher.finalize())
}

fn feed(hasher: &mut Sha256, part: &str) {
    hasher.update((part.len() as u64).to_le_bytes());
    hasher.update(part.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_are_ordered_and_deduplicated() {
        let key = CacheKey::new("q", ["Table:Post", "Table:Comment", "Table:Post"]);
        let deps: Vec<_> = key.dependencies.iter().cloned().collect();
        assert_eq!(deps, vec!["Table:Comment", "Table:Post"]);
    }

    #[test]
    fn root_keys_skip_blank_identifiers() {
        let key = CacheKey::new("q", ["Table:Post", "", "   "]);
        let roots: Vec<_> = key.root_keys().collect();
        assert_eq!(roots, vec!["Table:Post"]);
    }

    #[test]
    fn blank_hash_marks_absent_key() {
        assert!(CacheKey::new("", ["Table:Post"]).is_blank());
        assert!(CacheKey::new("  ", Vec::<String>::new()).is_blank());
        assert!(!CacheKey::new("q1", Vec::<String>::new()).is_blank());
    }

    #[test]
    fn query_hash_is_stable_for_same_input() {
        let params = [QueryParam::new("@id", "42")];
        let first = CacheKey::for_query("SELECT * FROM Post WHERE Id = @id", &params, ["Post"]);
        let second = CacheKey::for_query("SELECT * FROM Post WHERE Id = @id", &params, ["Post"]);
        assert_eq!(first.key_hash, second.key_hash);
        assert_eq!(first.key_hash.len(), 64);
    }

    #[test]
    fn parameter_values_change_the_hash() {
        let command = "SELECT * FROM Post WHERE Id = @id";
        let one = hash_query(command, &[QueryParam::new("@id", "1")]);
        let two = hash_query(command, &[QueryParam::new("@id", "2")]);
        assert_ne!(one, two);
    }

    #[test]
    fn component_boundaries_are_part_of_the_hash() {
        let left = hash_query("ab", &[QueryParam::new("c", "")]);
        let right = hash_query("a", &[QueryParam::new("bc", "")]);
        assert_ne!(left, right);
    }
}
