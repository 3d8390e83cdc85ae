//! Multimap whose per-key sequences stay sorted.

use std::fmt;
use std::hash::Hash;

use hashbrown::HashMap;

/// Maps each key to a sequence of values kept in ascending order.
///
/// Insertion places the new value after every value that compares less than
/// or equal to it, so equal values keep their insertion order. Empty buckets
/// are dropped.
pub struct SortedMultimap<K, V> {
    buckets: HashMap<K, Vec<V>>,
}

impl<K, V> Default for SortedMultimap<K, V> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V: Ord> SortedMultimap<K, V> {
    /// Create an empty multimap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `key`, keeping the bucket sorted.
    pub fn insert(&mut self, key: K, value: V) {
        let bucket = self.buckets.entry(key).or_default();
        let position = bucket.partition_point(|existing| existing <= &value);
        bucket.insert(position, value);
    }

    /// Remove the first value under `key` matching `predicate`.
    pub fn remove_where<F>(&mut self, key: &K, predicate: F) -> Option<V>
    where
        F: FnMut(&V) -> bool,
    {
        let bucket = self.buckets.get_mut(key)?;
        let position = bucket.iter().position(predicate)?;
        let value = bucket.remove(position);
        if bucket.is_empty() {
            self.buckets.remove(key);
        }
        Some(value)
    }

    /// Remove the first value under `key` equal to `value`.
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        self.remove_where(key, |existing| existing == value).is_some()
    }

    /// Values stored under `key`, in ascending order.
    #[must_use]
    pub fn get(&self, key: &K) -> &[V] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check if `key` holds at least one value.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.buckets.contains_key(key)
    }

    /// Iterate over keys with a non-empty bucket.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.buckets.keys()
    }

    /// Iterate over `(key, bucket)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &[V])> + '_ {
        self.buckets
            .iter()
            .map(|(key, bucket)| (key, bucket.as_slice()))
    }

    /// Total number of values across all buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Check if no value is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Remove every bucket.
    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for SortedMultimap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.buckets.iter()).finish()
    }
}
