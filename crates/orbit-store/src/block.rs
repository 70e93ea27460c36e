use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use orbit_types::Hash;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::Storage;

/// Externally supplied content-addressed block store.
///
/// Blocks are immutable byte strings addressed by their content hash. A
/// pinned block is retained by the store's garbage collection.
pub trait BlockStore: Send + Sync {
    /// Store a block under `hash`, pinning it if requested. Different bytes
    /// already held under `hash` are replaced.
    fn put_block(&self, hash: &Hash, data: &[u8], pin: bool) -> StoreResult<()>;

    /// Fetch a block. Returns `Ok(None)` if it is not available.
    fn get_block(&self, hash: &Hash) -> StoreResult<Option<Vec<u8>>>;

    /// Release a pin. Unpinning an unknown block is not an error.
    fn unpin(&self, hash: &Hash) -> StoreResult<()>;

    /// Returns `true` if the block is pinned.
    fn is_pinned(&self, hash: &Hash) -> StoreResult<bool>;
}

/// In-memory block store with pinning, shared between peers in tests.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Hash, Vec<u8>>>,
    pins: RwLock<HashSet<Hash>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks currently held.
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every unpinned block. Returns the number removed.
    pub fn gc(&self) -> usize {
        let pins = self.pins.read().expect("lock poisoned");
        let mut blocks = self.blocks.write().expect("lock poisoned");
        let before = blocks.len();
        blocks.retain(|hash, _| pins.contains(hash));
        before - blocks.len()
    }
}

impl BlockStore for MemoryBlockStore {
    fn put_block(&self, hash: &Hash, data: &[u8], pin: bool) -> StoreResult<()> {
        {
            let mut blocks = self.blocks.write().expect("lock poisoned");
            match blocks.get_mut(hash) {
                Some(existing) if existing.as_slice() == data => {}
                Some(existing) => {
                    debug!(block = %hash.short_hex(), "replacing differing block");
                    *existing = data.to_vec();
                }
                None => {
                    blocks.insert(*hash, data.to_vec());
                }
            }
        }
        if pin {
            self.pins.write().expect("lock poisoned").insert(*hash);
        }
        Ok(())
    }

    fn get_block(&self, hash: &Hash) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.blocks.read().expect("lock poisoned").get(hash).cloned())
    }

    fn unpin(&self, hash: &Hash) -> StoreResult<()> {
        self.pins.write().expect("lock poisoned").remove(hash);
        Ok(())
    }

    fn is_pinned(&self, hash: &Hash) -> StoreResult<bool> {
        Ok(self.pins.read().expect("lock poisoned").contains(hash))
    }
}

impl std::fmt::Debug for MemoryBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlockStore")
            .field("block_count", &self.len())
            .finish()
    }
}

/// [`Storage`] view over a [`BlockStore`].
///
/// Keys must be multibase content hashes. The block store cannot be
/// enumerated, so `entries` is always empty and `clear` does nothing;
/// `del` only releases the pin.
pub struct BlockStorage {
    blocks: Arc<dyn BlockStore>,
    pin: bool,
}

impl BlockStorage {
    pub fn new(blocks: Arc<dyn BlockStore>) -> Self {
        Self { blocks, pin: false }
    }

    /// Pin every block written through this view.
    pub fn pinned(blocks: Arc<dyn BlockStore>) -> Self {
        Self { blocks, pin: true }
    }

    fn parse_key(key: &str) -> StoreResult<Hash> {
        Hash::parse(key).map_err(|e| StoreError::InvalidKey {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Storage for BlockStorage {
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let hash = Self::parse_key(key)?;
        debug!(block = %hash.short_hex(), pin = self.pin, "writing block");
        self.blocks.put_block(&hash, value, self.pin)
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let hash = Self::parse_key(key)?;
        self.blocks.get_block(&hash)
    }

    fn del(&self, key: &str) -> StoreResult<()> {
        let hash = Self::parse_key(key)?;
        self.blocks.unpin(&hash)
    }

    fn entries(&self) -> StoreResult<Vec<(String, Vec<u8>)>> {
        Ok(Vec::new())
    }

    fn clear(&self) -> StoreResult<()> {
        Ok(())
    }
}
