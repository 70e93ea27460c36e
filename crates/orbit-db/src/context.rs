use std::sync::Arc;

use orbit_identity::{Identities, Identity};
use orbit_store::{
    BlockStorage, BlockStore, ComposedStorage, LruStorage, MemoryStorage, RedbStorage, Storage,
};
use orbit_sync::Network;
use orbit_types::Address;

use crate::config::OrbitDbConfig;
use crate::error::DbResult;
use crate::manifest::ContentStore;

/// The shared services databases are built from.
#[derive(Clone)]
pub struct DbContext {
    pub identities: Arc<Identities>,
    /// The identity databases write as.
    pub identity: Identity,
    pub blocks: Arc<dyn BlockStore>,
    pub network: Arc<dyn Network>,
    pub config: OrbitDbConfig,
}

impl DbContext {
    /// Manifests and access controller configuration, pinned in the block
    /// store.
    pub fn manifests(&self) -> ContentStore {
        ContentStore::new(Arc::new(BlockStorage::pinned(self.blocks.clone())))
    }

    /// Entry bytes: an LRU in front of the pinned block store.
    pub fn entry_storage(&self) -> Arc<dyn Storage> {
        Arc::new(ComposedStorage::new(
            Arc::new(LruStorage::new(self.config.lru_capacity)),
            Arc::new(BlockStorage::pinned(self.blocks.clone())),
        ))
    }

    /// Local per-database state named `name`: an LRU in front of a redb
    /// file under the configured directory, or of memory.
    pub fn local_storage(&self, address: &Address, name: &str) -> DbResult<Arc<dyn Storage>> {
        let backing: Arc<dyn Storage> = match &self.config.directory {
            Some(dir) => {
                let path = dir
                    .join(address.root().to_hex())
                    .join(format!("{name}.redb"));
                Arc::new(RedbStorage::open(path)?)
            }
            None => Arc::new(MemoryStorage::new()),
        };
        Ok(Arc::new(ComposedStorage::new(
            Arc::new(LruStorage::new(self.config.lru_capacity)),
            backing,
        )))
    }
}

impl std::fmt::Debug for DbContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbContext")
            .field("identity", &self.identity.hash)
            .field("peer", self.network.peer_id())
            .field("config", &self.config)
            .finish()
    }
}
