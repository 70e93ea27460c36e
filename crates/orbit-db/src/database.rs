use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orbit_identity::Identity;
use orbit_log::{AppendOptions, Entry, Log, LogOptions};
use orbit_sync::{LogSync, PeerId, SyncEvent};
use orbit_types::{Address, Hash};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::access::Access;
use crate::config::{DatabaseType, OpenOptions};
use crate::context::DbContext;
use crate::error::{DbError, DbResult};
use crate::manifest::Manifest;
use crate::operation::Operation;

const EVENT_CAPACITY: usize = 1024;

/// Notifications from an open database.
#[derive(Clone, Debug)]
pub enum DatabaseEvent {
    /// A local or remote entry was merged.
    Update(Entry<Operation>),
    /// Heads were exchanged with a peer.
    Join {
        peer: PeerId,
        heads: Vec<Entry<Operation>>,
    },
    Leave { peer: PeerId },
    Close,
    Drop,
    /// A remote entry or peer exchange failed.
    Error(String),
}

/// Runs inside the database write lock after every merged entry.
#[async_trait]
pub trait UpdateHook: Send + Sync {
    /// Called once before replication starts.
    async fn on_open(&self, _log: &Log<Operation>) -> DbResult<()> {
        Ok(())
    }

    async fn on_update(&self, log: &Log<Operation>, entry: &Entry<Operation>) -> DbResult<()>;

    async fn close(&self) -> DbResult<()> {
        Ok(())
    }

    async fn drop_state(&self) -> DbResult<()> {
        Ok(())
    }
}

/// State shared with the background sync task.
struct Shared {
    log: Arc<Log<Operation>>,
    hook: Option<Arc<dyn UpdateHook>>,
    write_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<DatabaseEvent>,
}

impl Shared {
    fn emit(&self, event: DatabaseEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn apply_remote(&self, bytes: &[u8]) -> DbResult<()> {
        let entry: Entry<Operation> = Entry::decode(bytes).map_err(DbError::Log)?;
        let _guard = self.write_lock.lock().await;
        if self.log.join_entry(&entry).await? {
            if let Some(hook) = &self.hook {
                hook.on_update(&self.log, &entry).await?;
            }
            debug!(log = %self.log.id(), entry = %entry.hash.short_hex(), "merged remote entry");
            self.emit(DatabaseEvent::Update(entry));
        }
        Ok(())
    }

    async fn run_sync(self: Arc<Self>, mut events: mpsc::Receiver<SyncEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                SyncEvent::Synced(bytes) => {
                    if let Err(e) = self.apply_remote(&bytes).await {
                        warn!(log = %self.log.id(), error = %e, "rejected remote entry");
                        self.emit(DatabaseEvent::Error(e.to_string()));
                    }
                }
                SyncEvent::Join { peer, heads } => {
                    let heads = heads
                        .iter()
                        .filter_map(|bytes| Entry::decode(bytes).ok())
                        .collect();
                    self.emit(DatabaseEvent::Join { peer, heads });
                }
                SyncEvent::Leave { peer } => self.emit(DatabaseEvent::Leave { peer }),
                SyncEvent::Error(message) => self.emit(DatabaseEvent::Error(message)),
            }
        }
    }
}

/// One replicated database: a log, its access controller, and a sync
/// session.
pub struct Database {
    name: String,
    address: Address,
    db_type: DatabaseType,
    meta: Option<Value>,
    identity: Identity,
    access: Access,
    references_count: usize,
    shared: Arc<Shared>,
    sync: Option<LogSync<Operation>>,
    sync_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Database {
    /// Open the database described by `manifest` at `address`.
    pub async fn open(
        ctx: &DbContext,
        address: Address,
        manifest: &Manifest,
        access: Access,
        options: &OpenOptions,
        hook: Option<Arc<dyn UpdateHook>>,
    ) -> DbResult<Self> {
        let db_type = manifest.database_type()?;
        let entry_storage = match &options.entry_storage {
            Some(storage) => storage.clone(),
            None => ctx.entry_storage(),
        };
        let heads_storage = match &options.heads_storage {
            Some(storage) => storage.clone(),
            None => ctx.local_storage(&address, "log/_heads")?,
        };
        let index_storage = match &options.index_storage {
            Some(storage) => storage.clone(),
            None => ctx.local_storage(&address, "log/_index")?,
        };

        let log = Arc::new(Log::open(
            ctx.identities.clone(),
            ctx.identity.clone(),
            LogOptions {
                log_id: Some(address.to_string()),
                access: Some(access.controller()),
                entry_storage: Some(entry_storage),
                heads_storage: Some(heads_storage),
                index_storage: Some(index_storage),
                ..LogOptions::default()
            },
        )?);
        if let Some(hook) = &hook {
            hook.on_open(&log).await?;
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            log: log.clone(),
            hook,
            write_lock: tokio::sync::Mutex::new(()),
            events,
        });

        let (sync, sync_task) = if options.sync {
            let (sync, rx) = LogSync::new(log, ctx.network.clone(), ctx.config.sync_timeout());
            let task = tokio::spawn(shared.clone().run_sync(rx));
            sync.start().await?;
            (Some(sync), Some(task))
        } else {
            (None, None)
        };

        info!(
            address = %address,
            name = %manifest.name,
            db_type = %db_type,
            access = %access.ac_type(),
            "opened database"
        );
        Ok(Self {
            name: manifest.name.clone(),
            address,
            db_type,
            meta: manifest.meta.clone(),
            identity: ctx.identity.clone(),
            access,
            references_count: options
                .references_count
                .unwrap_or(ctx.config.references_count),
            shared,
            sync,
            sync_task: Mutex::new(sync_task),
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn access(&self) -> &Access {
        &self.access
    }

    pub fn log(&self) -> &Arc<Log<Operation>> {
        &self.shared.log
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Peers currently replicating this database.
    pub fn peers(&self) -> Vec<PeerId> {
        self.sync.as_ref().map(|s| s.peers()).unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DatabaseEvent> {
        self.shared.events.subscribe()
    }

    /// Append an operation, publish it to peers, and notify subscribers.
    pub async fn add_operation(&self, op: Operation) -> DbResult<Hash> {
        if self.is_closed() {
            return Err(DbError::Closed);
        }
        let _guard = self.shared.write_lock.lock().await;
        let entry = self
            .shared
            .log
            .append(
                op,
                AppendOptions {
                    references_count: self.references_count,
                },
            )
            .await?;
        if let Some(sync) = &self.sync {
            sync.add(&entry).await?;
        }
        if let Some(hook) = &self.shared.hook {
            hook.on_update(&self.shared.log, &entry).await?;
        }
        let hash = entry.hash;
        self.shared.emit(DatabaseEvent::Update(entry));
        Ok(hash)
    }

    /// Stop replication, wait for pending writes, and release storage.
    pub async fn close(&self) -> DbResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(sync) = &self.sync {
            sync.stop().await?;
        }
        let task = self.sync_task.lock().expect("lock poisoned").take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }

        let _guard = self.shared.write_lock.lock().await;
        self.shared.log.close().await?;
        self.access.close().await?;
        if let Some(hook) = &self.shared.hook {
            hook.close().await?;
        }
        self.shared.emit(DatabaseEvent::Close);
        info!(address = %self.address, "closed database");
        Ok(())
    }

    /// Wait for pending writes, then erase everything stored locally.
    pub async fn drop(&self) -> DbResult<()> {
        let _guard = self.shared.write_lock.lock().await;
        self.shared.log.clear().await?;
        self.access.drop_state().await?;
        if let Some(hook) = &self.shared.hook {
            hook.drop_state().await?;
        }
        self.shared.emit(DatabaseEvent::Drop);
        info!(address = %self.address, "dropped database");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Some(task) = self.sync_task.lock().expect("lock poisoned").take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("db_type", &self.db_type)
            .field("access", &self.access.ac_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessControllerType, StaticAccessController};
    use crate::testing::context;
    use serde_json::json;

    async fn open(ctx: &DbContext, name: &str, write: Vec<String>) -> Database {
        let access = StaticAccessController::create(ctx, write).unwrap();
        let manifest = Manifest::new(name, DatabaseType::Events, access.address(), None);
        let address = Address::new(manifest.store(&ctx.manifests()).unwrap());
        Database::open(
            ctx,
            address,
            &manifest,
            Access::Static(Arc::new(access)),
            &OpenOptions::default().with_sync(false),
            None,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn add_operation_emits_update() {
        let ctx = context("userA");
        let db = open(&ctx, "feed", vec![ctx.identity.id.clone()]).await;
        let mut events = db.subscribe();

        let hash = db.add_operation(Operation::add(json!("hello"))).await.unwrap();
        match events.recv().await.unwrap() {
            DatabaseEvent::Update(entry) => {
                assert_eq!(entry.hash, hash);
                assert_eq!(entry.payload, Operation::add(json!("hello")));
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(db.log().heads().unwrap().len(), 1);
        assert_eq!(db.log().id(), db.address().to_string());
        assert_eq!(db.access().ac_type(), AccessControllerType::Static);
    }

    #[tokio::test]
    async fn writer_outside_write_list_is_refused() {
        let ctx = context("userA");
        let db = open(&ctx, "feed", vec!["someone-else".into()]).await;
        let err = db.add_operation(Operation::add(json!(1))).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Log(orbit_log::LogError::NotAllowed { .. })
        ));
        assert!(db.log().heads().unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_writes() {
        let ctx = context("userA");
        let db = open(&ctx, "feed", vec!["*".into()]).await;
        let mut events = db.subscribe();
        db.close().await.unwrap();
        db.close().await.unwrap();
        assert!(db.is_closed());
        assert!(matches!(events.recv().await.unwrap(), DatabaseEvent::Close));
        assert!(matches!(
            db.add_operation(Operation::add(json!(1))).await,
            Err(DbError::Closed)
        ));
    }

    #[tokio::test]
    async fn drop_clears_the_log() {
        let ctx = context("userA");
        let db = open(&ctx, "feed", vec!["*".into()]).await;
        let hash = db.add_operation(Operation::add(json!(1))).await.unwrap();
        let mut events = db.subscribe();
        db.drop().await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), DatabaseEvent::Drop));
        assert!(db.log().heads().unwrap().is_empty());
        assert!(!db.log().has(&hash).unwrap());
    }
}
