// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Capacity-bounded least-recently-used cache.
//!
//! Used by [`FileRegistry`](crate::FileRegistry) to avoid re-parsing
//! descriptor documents on every read.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// LRU cache keyed by `K`.
///
/// Every `get` hit and every `put` refreshes the entry. When the cache is full,
/// the entry with the oldest access is evicted.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    /// Fetch a value, marking it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let tick = self.next_tick();
        let (value, last) = self.entries.get_mut(key)?;
        let key = self.order.remove(&*last)?;
        *last = tick;
        self.order.insert(tick, key);
        Some(value.clone())
    }

    /// Insert or replace a value, evicting the least recently used entry if full.
    pub fn put(&mut self, key: K, value: V) {
        let tick = self.next_tick();
        if let Some((_, last)) = self.entries.remove(&key) {
            self.order.remove(&last);
        } else if self.entries.len() >= self.capacity
            && let Some((_, oldest)) = self.order.pop_first()
        {
            self.entries.remove(&oldest);
        }
        self.order.insert(tick, key.clone());
        self.entries.insert(key, (value, tick));
    }

    /// Drop an entry.
    pub fn invalidate<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if let Some((_, last)) = self.entries.remove(key) {
            self.order.remove(&last);
        }
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);

        // touch "a" so "b" becomes the eviction candidate
        assert_eq!(cache.get("a"), Some(1));
        cache.put("c".to_string(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn test_put_replaces_without_eviction() {
        let mut cache = LruCache::new(2);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.put("a".to_string(), 10);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let mut cache = LruCache::new(4);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.invalidate("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = LruCache::new(0);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some(2));
    }
}
