use std::collections::HashMap;
use std::sync::Arc;

use orbit_identity::{Identities, Identity, Keystore, ProviderRegistry, ProviderType};
use orbit_store::{
    BlockStorage, BlockStore, ComposedStorage, LruStorage, MemoryStorage, RedbStorage, Storage,
};
use orbit_sync::Network;
use orbit_types::Address;
use tokio::sync::Mutex;
use tracing::info;

use crate::access::Access;
use crate::config::{DatabaseType, OpenOptions, OrbitDbConfig};
use crate::context::DbContext;
use crate::documents::DocumentsDb;
use crate::error::{DbError, DbResult};
use crate::events::EventsDb;
use crate::keyvalue::KeyValueDb;
use crate::keyvalue_indexed::KeyValueIndexedDb;
use crate::manifest::Manifest;
use crate::store::Store;

const VERIFIED_CACHE_CAPACITY: usize = 1000;

/// Entry point: one identity, one block store, one network, and the
/// databases opened through them.
pub struct OrbitDb {
    ctx: DbContext,
    databases: Mutex<HashMap<String, Store>>,
}

impl OrbitDb {
    /// Build identities from `config`: the keystore lives in
    /// `<directory>/keystore.redb` (or memory), and identities are cached in
    /// front of the block store so peers can resolve each other's.
    pub fn new(
        config: OrbitDbConfig,
        blocks: Arc<dyn BlockStore>,
        network: Arc<dyn Network>,
    ) -> DbResult<Self> {
        let keystore: Arc<dyn Storage> = match &config.directory {
            Some(dir) => Arc::new(RedbStorage::open(dir.join("keystore.redb"))?),
            None => Arc::new(MemoryStorage::new()),
        };
        let identities = Arc::new(Identities::new(
            Arc::new(Keystore::new(keystore)),
            Arc::new(ComposedStorage::new(
                Arc::new(LruStorage::new(config.lru_capacity)),
                Arc::new(BlockStorage::pinned(blocks.clone())),
            )),
            Arc::new(LruStorage::new(VERIFIED_CACHE_CAPACITY)),
            Arc::new(ProviderRegistry::with_defaults()),
        ));
        Self::with_identities(config, identities, blocks, network)
    }

    /// Use an existing identity registry.
    pub fn with_identities(
        config: OrbitDbConfig,
        identities: Arc<Identities>,
        blocks: Arc<dyn BlockStore>,
        network: Arc<dyn Network>,
    ) -> DbResult<Self> {
        let identity = identities.create_identity(&config.id, ProviderType::PublicKey)?;
        info!(
            id = %config.id,
            identity = %identity.hash.short_hex(),
            peer = %network.peer_id(),
            "orbitdb started"
        );
        Ok(Self {
            ctx: DbContext {
                identities,
                identity,
                blocks,
                network,
                config,
            },
            databases: Mutex::new(HashMap::new()),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.ctx.identity
    }

    pub fn identities(&self) -> &Arc<Identities> {
        &self.ctx.identities
    }

    pub fn context(&self) -> &DbContext {
        &self.ctx
    }

    /// Open a database by address, or create one by name.
    ///
    /// An address is resolved through its manifest; a type in `options`
    /// must then agree with the manifest. A name creates a fresh access
    /// controller and manifest from `options`. Opening an address that is
    /// already open returns the existing handle.
    pub async fn open(&self, name_or_address: &str, options: OpenOptions) -> DbResult<Store> {
        let mut databases = self.databases.lock().await;
        let ctx = &self.ctx;

        let (address, manifest) = if Address::is_valid(name_or_address) {
            let address = Address::parse(name_or_address)?;
            let manifest = Manifest::load(&ctx.manifests(), address.root())?;
            let db_type = manifest.database_type()?;
            if let Some(wanted) = options.db_type {
                if wanted != db_type {
                    return Err(DbError::TypeMismatch {
                        expected: wanted.to_string(),
                        actual: db_type.to_string(),
                    });
                }
            }
            (address, manifest)
        } else {
            let access = Access::store(ctx, name_or_address, &options.access)?;
            let manifest = Manifest::new(
                name_or_address,
                options.db_type.unwrap_or_default(),
                access,
                options.meta.clone(),
            );
            let address = Address::new(manifest.store(&ctx.manifests())?);
            (address, manifest)
        };

        let key = address.to_string();
        if let Some(store) = databases.get(&key) {
            if !store.database().is_closed() {
                return Ok(store.clone());
            }
        }
        let access = Access::resolve(ctx, &manifest.access_controller).await?;
        let store = Store::open(ctx, address, &manifest, access, &options).await?;
        databases.insert(key, store.clone());
        Ok(store)
    }

    pub async fn open_events(&self, name_or_address: &str, options: OpenOptions) -> DbResult<EventsDb> {
        match self.open(name_or_address, options.with_type(DatabaseType::Events)).await? {
            Store::Events(db) => Ok(db),
            other => Err(mismatch(DatabaseType::Events, &other)),
        }
    }

    pub async fn open_documents(
        &self,
        name_or_address: &str,
        options: OpenOptions,
    ) -> DbResult<DocumentsDb> {
        match self.open(name_or_address, options.with_type(DatabaseType::Documents)).await? {
            Store::Documents(db) => Ok(db),
            other => Err(mismatch(DatabaseType::Documents, &other)),
        }
    }

    pub async fn open_keyvalue(
        &self,
        name_or_address: &str,
        options: OpenOptions,
    ) -> DbResult<KeyValueDb> {
        match self.open(name_or_address, options.with_type(DatabaseType::KeyValue)).await? {
            Store::KeyValue(db) => Ok(db),
            other => Err(mismatch(DatabaseType::KeyValue, &other)),
        }
    }

    pub async fn open_keyvalue_indexed(
        &self,
        name_or_address: &str,
        options: OpenOptions,
    ) -> DbResult<KeyValueIndexedDb> {
        match self
            .open(name_or_address, options.with_type(DatabaseType::KeyValueIndexed))
            .await?
        {
            Store::KeyValueIndexed(db) => Ok(db),
            other => Err(mismatch(DatabaseType::KeyValueIndexed, &other)),
        }
    }

    /// Addresses of databases opened here and not yet closed.
    pub async fn open_databases(&self) -> Vec<Address> {
        let databases = self.databases.lock().await;
        let mut open: Vec<Address> = databases
            .values()
            .filter(|store| !store.database().is_closed())
            .map(|store| *store.address())
            .collect();
        open.sort();
        open
    }

    /// Close every open database, then the keystore.
    pub async fn stop(&self) -> DbResult<()> {
        let stores: Vec<Store> = self.databases.lock().await.drain().map(|(_, s)| s).collect();
        for store in &stores {
            store.database().close().await?;
        }
        self.ctx.identities.keystore().close()?;
        info!(closed = stores.len(), "orbitdb stopped");
        Ok(())
    }
}

fn mismatch(expected: DatabaseType, actual: &Store) -> DbError {
    DbError::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.db_type().to_string(),
    }
}

impl std::fmt::Debug for OrbitDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrbitDb").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}
