//! Capacity-bounded LRU cache (spec §4.C) used by the queue processor to
//! remember recently-applied operation signatures for idempotency checks.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

/// Hit/miss counters exposed through the processor's diagnostics surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// An O(1) get/put LRU cache with a fixed capacity. Internally a `HashMap`
/// from key to slot index plus an intrusive doubly-linked list over a slab,
/// so eviction never needs to scan.
struct Inner<K, V> {
    capacity: usize,
    slab: Vec<Option<Node<K, V>>>,
    index: HashMap<K, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    free: Vec<usize>,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slab: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            free: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.slab[idx].as_ref().unwrap();
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.slab[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slab[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.slab[idx].as_mut().unwrap();
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.slab[h].as_mut().unwrap().prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.push_front(idx);
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        if let Some(&idx) = self.index.get(key) {
            self.touch(idx);
            self.stats.hits += 1;
            self.slab[idx].as_ref().map(|n| &n.value)
        } else {
            self.stats.misses += 1;
            None
        }
    }

    fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    fn put(&mut self, key: K, value: V) {
        if let Some(&idx) = self.index.get(&key) {
            self.slab[idx].as_mut().unwrap().value = value;
            self.touch(idx);
            return;
        }

        if self.index.len() >= self.capacity {
            if let Some(tail) = self.tail {
                let evicted_key = self.slab[tail].as_ref().unwrap().key.clone();
                self.detach(tail);
                self.index.remove(&evicted_key);
                self.slab[tail] = None;
                self.free.push(tail);
                self.stats.evictions += 1;
            }
        }

        let idx = match self.free.pop() {
            Some(i) => i,
            None => {
                self.slab.push(None);
                self.slab.len() - 1
            }
        };
        self.slab[idx] = Some(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.push_front(idx);
        self.index.insert(key, idx);
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn clear(&mut self) {
        self.slab.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
        self.free.clear();
    }
}

/// Thread-safe wrapper around [`Inner`]; the processor shares one instance
/// across concurrently-running handler tasks.
pub struct LruCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::new(capacity)),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn put(&self, key: K, value: V) {
        self.inner.lock().put(key, value);
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, used by the background optimizer when resident
    /// usage grows past its bounds (§4.K).
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_hits() {
        let cache: LruCache<String, u32> = LruCache::new(2);
        cache.put("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn get_missing_counts_miss() {
        let cache: LruCache<String, u32> = LruCache::new(2);
        assert_eq!(cache.get(&"missing".to_string()), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache: LruCache<&str, u32> = LruCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.get(&"a"); // "a" now most-recent, "b" is LRU
        cache.put("c", 3); // should evict "b"
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn put_existing_key_updates_value_without_eviction() {
        let cache: LruCache<&str, u32> = LruCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("a", 10);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn capacity_one_always_evicts_previous() {
        let cache: LruCache<&str, u32> = LruCache::new(1);
        cache.put("a", 1);
        cache.put("b", 2);
        assert!(!cache.contains(&"a"));
        assert!(cache.contains(&"b"));
    }
}
