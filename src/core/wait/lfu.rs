//=========================================================================
// LFU Cache
//=========================================================================
//
// Fixed-capacity map that evicts the least-frequently-used entry when
// full. Ties are broken by insertion order (oldest first), so a burst of
// new one-off keys cannot push out a key that is requested every frame.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;
use std::hash::Hash;

//=== Entry ===============================================================

struct Entry<V> {
    value: V,
    hits: u64,
    stamp: u64,
}

//=== LfuCache ============================================================

/// Bounded cache with least-frequently-used eviction.
pub(crate) struct LfuCache<K, V> {
    capacity: usize,
    entries: HashMap<K, Entry<V>>,
    next_stamp: u64,
    evictions: u64,
}

impl<K: Hash + Eq + Clone, V> LfuCache<K, V> {
    /// Creates an empty cache. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            next_stamp: 0,
            evictions: 0,
        }
    }

    /// Looks up `key`, counting the access as a use.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get_mut(key).map(|entry| {
            entry.hits += 1;
            &entry.value
        })
    }

    /// Inserts `key`, evicting the least-used entry if the cache is full.
    ///
    /// Re-inserting an existing key replaces its value and keeps its count.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.hits += 1;
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_one();
        }

        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.entries.insert(key, Entry { value, hits: 1, stamp });
    }

    #[cfg(test)]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries evicted since creation.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    fn evict_one(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.hits, entry.stamp))
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
            self.evictions += 1;
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
