use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::Storage;

/// In-memory, HashMap-based store.
///
/// Intended for tests and ephemeral databases. Values are held behind a
/// `RwLock` for safe concurrent access and cloned on read.
pub struct MemoryStorage {
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.values.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.values.read().expect("lock poisoned").is_empty()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut map = self.values.write().expect("lock poisoned");
        map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let map = self.values.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn del(&self, key: &str) -> StoreResult<()> {
        self.values.write().expect("lock poisoned").remove(key);
        Ok(())
    }

    fn entries(&self) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let map = self.values.read().expect("lock poisoned");
        let mut all: Vec<_> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }

    fn clear(&self) -> StoreResult<()> {
        self.values.write().expect("lock poisoned").clear();
        Ok(())
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.values.read().expect("lock poisoned").contains_key(key))
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("key_count", &self.len())
            .finish()
    }
}
