//! Reference-counting set.

use std::fmt;
use std::hash::Hash;

use hashbrown::HashMap;

/// A set that counts how many times each key was added.
///
/// A key stays a member until it has been removed as many times as it was
/// added. Removing an absent key is a no-op.
#[derive(Clone)]
pub struct Multiset<K> {
    counts: HashMap<K, usize>,
}

impl<K> Default for Multiset<K> {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> Multiset<K> {
    /// Create an empty multiset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one reference to `key`.
    pub fn add(&mut self, key: K) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    /// Add one reference to each key.
    pub fn add_all<I: IntoIterator<Item = K>>(&mut self, keys: I) {
        for key in keys {
            self.add(key);
        }
    }

    /// Drop one reference to `key`.
    ///
    /// Returns `true` if the key was present.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(count) = self.counts.get_mut(key) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.counts.remove(key);
        }
        true
    }

    /// Drop one reference to each key.
    pub fn remove_all<'a, I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        for key in keys {
            self.remove(key);
        }
    }

    /// Add every reference held by `source`.
    pub fn update(&mut self, source: &Self) {
        for (key, &count) in &source.counts {
            *self.counts.entry(key.clone()).or_insert(0) += count;
        }
    }

    /// Drop every reference held by `source`, saturating at zero.
    pub fn difference_update(&mut self, source: &Self) {
        for (key, &count) in &source.counts {
            if let Some(current) = self.counts.get_mut(key) {
                *current = current.saturating_sub(count);
                if *current == 0 {
                    self.counts.remove(key);
                }
            }
        }
    }

    /// Number of references held for `key` (0 if absent).
    #[must_use]
    pub fn count(&self, key: &K) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Check if `key` has at least one reference.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.counts.contains_key(key)
    }

    /// Iterate over distinct keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.counts.keys()
    }

    /// Iterate over `(key, count)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&K, usize)> + '_ {
        self.counts.iter().map(|(key, &count)| (key, count))
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Sum of all reference counts.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Check if no key is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Remove every key.
    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

impl<K: Eq + Hash + Clone> Extend<K> for Multiset<K> {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        self.add_all(iter);
    }
}

impl<K: Eq + Hash + Clone> FromIterator<K> for Multiset<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = Self::new();
        set.add_all(iter);
        set
    }
}

impl<K: fmt::Debug> fmt::Debug for Multiset<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.counts.iter()).finish()
    }
}
