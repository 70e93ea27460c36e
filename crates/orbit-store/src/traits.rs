use std::sync::Arc;

use crate::error::StoreResult;

/// Byte-oriented key-value store.
///
/// All implementations must satisfy these invariants:
/// - `get` of a missing key returns `Ok(None)`.
/// - Each call is atomic for its key; concurrent readers are always safe.
/// - The store never interprets values.
/// - All backend errors are propagated, never silently ignored.
pub trait Storage: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Remove `key`. Removing a missing key is not an error.
    fn del(&self, key: &str) -> StoreResult<()>;

    /// Every key-value pair currently held.
    ///
    /// Backends that cannot enumerate their contents return an empty list.
    fn entries(&self) -> StoreResult<Vec<(String, Vec<u8>)>>;

    /// Remove every key.
    fn clear(&self) -> StoreResult<()>;

    /// Release backend resources. The default does nothing.
    fn close(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Check whether `key` is present.
    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Copy every entry of `other` into this store.
    fn merge(&self, other: &dyn Storage) -> StoreResult<()> {
        for (key, value) in other.entries()? {
            self.put(&key, &value)?;
        }
        Ok(())
    }
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        (**self).put(key, value)
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn del(&self, key: &str) -> StoreResult<()> {
        (**self).del(key)
    }

    fn entries(&self) -> StoreResult<Vec<(String, Vec<u8>)>> {
        (**self).entries()
    }

    fn clear(&self) -> StoreResult<()> {
        (**self).clear()
    }

    fn close(&self) -> StoreResult<()> {
        (**self).close()
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        (**self).contains(key)
    }

    fn merge(&self, other: &dyn Storage) -> StoreResult<()> {
        (**self).merge(other)
    }
}
