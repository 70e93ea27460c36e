use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::StoreResult;
use crate::traits::Storage;

/// Two storage tiers behind one [`Storage`].
///
/// Reads try the first (fast) tier, fall through to the second, and backfill
/// the first tier on a hit. Writes, deletes, clears, and merges go to both.
pub struct ComposedStorage {
    first: Arc<dyn Storage>,
    second: Arc<dyn Storage>,
}

impl ComposedStorage {
    pub fn new(first: Arc<dyn Storage>, second: Arc<dyn Storage>) -> Self {
        Self { first, second }
    }
}

impl Storage for ComposedStorage {
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.first.put(key, value)?;
        self.second.put(key, value)
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        if let Some(value) = self.first.get(key)? {
            return Ok(Some(value));
        }
        match self.second.get(key)? {
            Some(value) => {
                self.first.put(key, &value)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn del(&self, key: &str) -> StoreResult<()> {
        self.first.del(key)?;
        self.second.del(key)
    }

    fn entries(&self) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let mut all: BTreeMap<String, Vec<u8>> = self.second.entries()?.into_iter().collect();
        all.extend(self.first.entries()?);
        Ok(all.into_iter().collect())
    }

    fn clear(&self) -> StoreResult<()> {
        self.first.clear()?;
        self.second.clear()
    }

    fn close(&self) -> StoreResult<()> {
        self.first.close()?;
        self.second.close()
    }

    fn merge(&self, other: &dyn Storage) -> StoreResult<()> {
        self.first.merge(other)?;
        self.second.merge(other)
    }
}
