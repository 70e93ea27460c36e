use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::error::StoreResult;
use crate::traits::Storage;

/// Default number of keys an [`LruStorage`] retains.
pub const DEFAULT_LRU_CAPACITY: usize = 1_000_000;

/// Bounded in-memory store that evicts the least recently used key.
///
/// Used as the fast tier of a [`ComposedStorage`](crate::ComposedStorage)
/// and as the process-wide verified-identity cache.
pub struct LruStorage {
    cache: Mutex<LruCache<String, Vec<u8>>>,
}

impl LruStorage {
    /// Create a cache holding at most `capacity` keys. A zero capacity is
    /// treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.cache.lock().expect("lock poisoned").cap().get()
    }

    pub fn len(&self) -> usize {
        self.cache.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LruStorage {
    fn default() -> Self {
        Self::new(DEFAULT_LRU_CAPACITY)
    }
}

impl Storage for LruStorage {
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut cache = self.cache.lock().expect("lock poisoned");
        cache.put(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut cache = self.cache.lock().expect("lock poisoned");
        Ok(cache.get(key).cloned())
    }

    fn del(&self, key: &str) -> StoreResult<()> {
        self.cache.lock().expect("lock poisoned").pop(key);
        Ok(())
    }

    fn entries(&self) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let cache = self.cache.lock().expect("lock poisoned");
        Ok(cache.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn clear(&self) -> StoreResult<()> {
        self.cache.lock().expect("lock poisoned").clear();
        Ok(())
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.cache.lock().expect("lock poisoned").contains(key))
    }
}

impl std::fmt::Debug for LruStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruStorage")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let store = LruStorage::new(2);
        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();
        // Touch "a" so "b" becomes the eviction candidate.
        store.get("a").unwrap();
        store.put("c", b"3").unwrap();
        assert_eq!(store.get("b").unwrap(), None);
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("c").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn zero_capacity_holds_one() {
        let store = LruStorage::new(0);
        assert_eq!(store.capacity(), 1);
        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn default_capacity() {
        assert_eq!(LruStorage::default().capacity(), DEFAULT_LRU_CAPACITY);
    }

    #[test]
    fn del_clear_entries() {
        let store = LruStorage::new(10);
        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();
        store.del("a").unwrap();
        assert_eq!(store.entries().unwrap(), vec![("b".to_string(), b"2".to_vec())]);
        store.clear().unwrap();
        assert!(store.is_empty());
    }
}
